// Centralized metric name constants for queues and topics.
// Registered and exported by the relay binary.

#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    pub description: &'static str,
}

pub const COUNTERS: [Metric; 9] = [
    QUEUE_MESSAGES_ENQUEUED_TOTAL,
    QUEUE_MESSAGES_RECEIVED_TOTAL,
    QUEUE_MESSAGES_ACKED_TOTAL,
    QUEUE_MESSAGES_REDELIVERED_TOTAL,
    QUEUE_MESSAGES_DEAD_LETTERED_TOTAL,
    QUEUE_MESSAGES_EXPIRED_TOTAL,
    TOPIC_PUBLISHED_TOTAL,
    TOPIC_DELIVERIES_TOTAL,
    TOPIC_DELIVERY_RETRIES_TOTAL,
];

pub const GAUGES: [Metric; 2] = [QUEUE_VISIBLE_MESSAGES, QUEUE_IN_FLIGHT_MESSAGES];

// QUEUE Metrics --------------------------

pub const QUEUE_MESSAGES_ENQUEUED_TOTAL: Metric = Metric {
    name: "relay_queue_messages_enqueued_total",
    description: "Total messages appended to the queue",
};

pub const QUEUE_MESSAGES_RECEIVED_TOTAL: Metric = Metric {
    name: "relay_queue_messages_received_total",
    description: "Total leases handed out by the queue (redeliveries included)",
};

pub const QUEUE_MESSAGES_ACKED_TOTAL: Metric = Metric {
    name: "relay_queue_messages_acked_total",
    description: "Total messages acknowledged and removed from the queue",
};

pub const QUEUE_MESSAGES_REDELIVERED_TOTAL: Metric = Metric {
    name: "relay_queue_messages_redelivered_total",
    description: "Total leases that expired without acknowledgment",
};

pub const QUEUE_MESSAGES_DEAD_LETTERED_TOTAL: Metric = Metric {
    name: "relay_queue_messages_dead_lettered_total",
    description: "Total messages moved to the dead-letter queue after max_receive_count",
};

pub const QUEUE_MESSAGES_EXPIRED_TOTAL: Metric = Metric {
    name: "relay_queue_messages_expired_total",
    description: "Total messages discarded because they outlived the queue retention",
};

pub const QUEUE_VISIBLE_MESSAGES: Metric = Metric {
    name: "relay_queue_visible_messages",
    description: "Messages waiting to be received",
};

pub const QUEUE_IN_FLIGHT_MESSAGES: Metric = Metric {
    name: "relay_queue_in_flight_messages",
    description: "Messages currently leased to a consumer",
};

// TOPIC Metrics --------------------------

pub const TOPIC_PUBLISHED_TOTAL: Metric = Metric {
    name: "relay_topic_published_total",
    description: "Total messages published to the topic",
};

pub const TOPIC_DELIVERIES_TOTAL: Metric = Metric {
    name: "relay_topic_deliveries_total",
    description: "Total successful deliveries from the topic to a subscribed queue",
};

pub const TOPIC_DELIVERY_RETRIES_TOTAL: Metric = Metric {
    name: "relay_topic_delivery_retries_total",
    description: "Total failed delivery attempts that were rescheduled",
};
