//! HTTP handlers for the catalog API

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use axum_helpers::{
    ValidatedJson,
    errors::responses::{
        BadRequestValidationResponse, ForbiddenResponse, InternalServerErrorResponse,
        NotFoundResponse, UnauthorizedResponse,
    },
};
use std::sync::Arc;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::cache::ProductCache;
use crate::error::ProductResult;
use crate::models::{CreateProduct, Product, UpdateProduct};
use crate::repository::ProductRepository;
use crate::service::CatalogService;

type SharedService<R, C> = Arc<CatalogService<R, C>>;

/// OpenAPI documentation for the catalog API
#[derive(OpenApi)]
#[openapi(
    paths(list_products, get_product, create_product, update_product, delete_product),
    components(
        schemas(Product, CreateProduct, UpdateProduct),
        responses(
            NotFoundResponse,
            BadRequestValidationResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            InternalServerErrorResponse
        )
    ),
    modifiers(&BearerAuth),
    security(("bearer_auth" = [])),
    tags(
        (name = "Products", description = "Product catalog endpoints")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Routes open to any authenticated caller.
pub fn read_routes<R, C>(service: SharedService<R, C>) -> Router
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
        .with_state(service)
}

/// Routes that change the catalog.
pub fn write_routes<R, C>(service: SharedService<R, C>) -> Router
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    Router::new()
        .route("/create-product", post(create_product))
        .route("/update-product/{id}", put(update_product))
        .route("/delete-product/{id}", delete(delete_product))
        .with_state(service)
}

/// Every catalog route, without any access control.
pub fn router<R, C>(service: CatalogService<R, C>) -> Router
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    let shared_service = Arc::new(service);
    read_routes(Arc::clone(&shared_service)).merge(write_routes(shared_service))
}

/// List every product
#[utoipa::path(
    get,
    path = "",
    tag = "Products",
    responses(
        (status = 200, description = "List of products", body = Vec<Product>),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_products<R: ProductRepository, C: ProductCache>(
    State(service): State<SharedService<R, C>>,
) -> ProductResult<Json<Vec<Product>>> {
    let products = service.get_all().await?;
    Ok(Json(products))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Products",
    params(
        ("id" = String, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product found", body = Product),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_product<R: ProductRepository, C: ProductCache>(
    State(service): State<SharedService<R, C>>,
    Path(id): Path<String>,
) -> ProductResult<Json<Product>> {
    let product = service.get_by_id(&id).await?;
    Ok(Json(product))
}

/// Create a new product
#[utoipa::path(
    post,
    path = "/create-product",
    tag = "Products",
    request_body = CreateProduct,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn create_product<R: ProductRepository, C: ProductCache>(
    State(service): State<SharedService<R, C>>,
    ValidatedJson(input): ValidatedJson<CreateProduct>,
) -> ProductResult<impl IntoResponse> {
    let product = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Replace every field of a product
#[utoipa::path(
    put,
    path = "/update-product/{id}",
    tag = "Products",
    params(
        ("id" = String, Path, description = "Product ID")
    ),
    request_body = UpdateProduct,
    responses(
        (status = 200, description = "Product updated", body = Product),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn update_product<R: ProductRepository, C: ProductCache>(
    State(service): State<SharedService<R, C>>,
    Path(id): Path<String>,
    ValidatedJson(input): ValidatedJson<UpdateProduct>,
) -> ProductResult<Json<Product>> {
    let product = service.update(&id, input).await?;
    Ok(Json(product))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/delete-product/{id}",
    tag = "Products",
    params(
        ("id" = String, Path, description = "Product ID")
    ),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn delete_product<R: ProductRepository, C: ProductCache>(
    State(service): State<SharedService<R, C>>,
    Path(id): Path<String>,
) -> ProductResult<StatusCode> {
    service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
