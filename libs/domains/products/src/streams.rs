//! Request streams consumed by the inventory workers.
//!
//! The stream names match the queues order services already publish to.

use stream_worker::StreamDef;

/// Consumer group shared by the three inventory streams.
pub const INVENTORY_CONSUMER_GROUP: &str = "product-inventory";

/// Stock reservations for newly created orders.
pub struct OrderCreatedStream;

impl StreamDef for OrderCreatedStream {
    const STREAM_NAME: &'static str = "create-queue";
    const CONSUMER_GROUP: &'static str = INVENTORY_CONSUMER_GROUP;
}

/// Stock reservations for amended orders.
pub struct OrderUpdatedStream;

impl StreamDef for OrderUpdatedStream {
    const STREAM_NAME: &'static str = "update-queue";
    const CONSUMER_GROUP: &'static str = INVENTORY_CONSUMER_GROUP;
}

/// Stock releases for cancelled orders.
pub struct OrderDeletedStream;

impl StreamDef for OrderDeletedStream {
    const STREAM_NAME: &'static str = "delete-queue";
    const CONSUMER_GROUP: &'static str = INVENTORY_CONSUMER_GROUP;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names() {
        assert_eq!(OrderCreatedStream::stream_name(), "create-queue");
        assert_eq!(OrderUpdatedStream::stream_name(), "update-queue");
        assert_eq!(OrderDeletedStream::stream_name(), "delete-queue");
    }

    #[test]
    fn test_streams_share_group() {
        assert_eq!(OrderCreatedStream::consumer_group(), "product-inventory");
        assert_eq!(OrderUpdatedStream::consumer_group(), "product-inventory");
        assert_eq!(OrderDeletedStream::consumer_group(), "product-inventory");
    }
}
