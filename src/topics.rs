//! Topic subscription façade.
//!
//! Turns "send me updates about X, filtered by Y" into exactly one
//! `subscribe:<topic>` control message, and mirrors it with
//! `unsubscribe:<topic>`. Updates then arrive as named events through the
//! multiplexer, so callers pair a subscription with `client.on(..)`.
//!
//! Subscribing requires a live connection: while disconnected the call logs a
//! warning, queues nothing and returns `false`. Successful subscriptions are
//! remembered and, unless disabled through
//! [`ConnectionOptions::resubscribe_on_reconnect`](crate::ConnectionOptions),
//! replayed after every successful (re)connect.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::client::StoreLinkClient;
use crate::error::StoreLinkError;
use crate::models::ClientMessage;
use crate::scheduler::DEFAULT_PRIORITY;

/// Channels of the shop topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopChannel {
    Products,
    Orders,
    Inventory,
    Customers,
    Settings,
}

impl ShopChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShopChannel::Products => "products",
            ShopChannel::Orders => "orders",
            ShopChannel::Inventory => "inventory",
            ShopChannel::Customers => "customers",
            ShopChannel::Settings => "settings",
        }
    }
}

/// Components of the bot dashboard topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotComponent {
    Stats,
    Verifications,
    InviteCodes,
}

impl BotComponent {
    pub const ALL: [BotComponent; 3] =
        [BotComponent::Stats, BotComponent::Verifications, BotComponent::InviteCodes];

    pub fn as_str(&self) -> &'static str {
        match self {
            BotComponent::Stats => "stats",
            BotComponent::Verifications => "verifications",
            BotComponent::InviteCodes => "invite_codes",
        }
    }
}

/// A business topic the backend streams updates for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Orders,
    Drops,
    /// A single drop.
    Drop(String),
    Tickets,
    /// A single support ticket.
    Ticket(String),
    Kpis,
    SystemHealth,
    Notifications,
    Inventory,
    Shop(Vec<ShopChannel>),
    /// Image sync for one product.
    ProductImages(String),
    BotDashboard(Vec<BotComponent>),
}

impl Topic {
    /// Name used in the control message (`subscribe:<name>`).
    pub fn name(&self) -> &'static str {
        match self {
            Topic::Orders => "orders",
            Topic::Drops => "drops",
            Topic::Drop(_) => "drop",
            Topic::Tickets => "tickets",
            Topic::Ticket(_) => "ticket",
            Topic::Kpis => "kpis",
            Topic::SystemHealth => "system_health",
            Topic::Notifications => "notifications",
            Topic::Inventory => "inventory",
            Topic::Shop(_) => "shop",
            Topic::ProductImages(_) => "product_images",
            Topic::BotDashboard(_) => "bot_dashboard",
        }
    }

    /// Payload key for an explicit id list.
    pub fn ids_key(&self) -> &'static str {
        match self {
            Topic::Orders => "orderIds",
            Topic::Drops | Topic::Drop(_) => "dropIds",
            Topic::Tickets | Topic::Ticket(_) => "ticketIds",
            Topic::Kpis => "metrics",
            Topic::SystemHealth => "services",
            Topic::Notifications => "notificationIds",
            Topic::Inventory => "productIds",
            Topic::Shop(_) => "shopIds",
            Topic::ProductImages(_) => "imageIds",
            Topic::BotDashboard(_) => "botIds",
        }
    }

    /// `(payload key, id)` for per-entity topics.
    pub fn entity(&self) -> Option<(&'static str, &str)> {
        match self {
            Topic::Drop(id) => Some(("dropId", id)),
            Topic::Ticket(id) => Some(("ticketId", id)),
            Topic::ProductImages(id) => Some(("productId", id)),
            _ => None,
        }
    }

    /// Identity of the subscription: the name plus the entity id, if any.
    pub fn key(&self) -> String {
        match self.entity() {
            Some((_, id)) => format!("{}:{}", self.name(), id),
            None => self.name().to_string(),
        }
    }

    /// `subscribe:<name>` carrying entity id, id list, filters and any
    /// topic-specific component list.
    pub fn subscribe_message(&self, filter: &TopicFilter) -> ClientMessage {
        let mut data = Map::new();

        if let Some((key, id)) = self.entity() {
            data.insert(key.to_string(), JsonValue::from(id));
        }
        if !filter.ids.is_empty() {
            data.insert(self.ids_key().to_string(), JsonValue::from(filter.ids.clone()));
        }
        for (key, value) in &filter.filters {
            data.insert(key.clone(), value.clone());
        }

        match self {
            Topic::Shop(channels) => {
                let channels: Vec<&str> = channels.iter().map(ShopChannel::as_str).collect();
                data.insert("channels".to_string(), JsonValue::from(channels));
            },
            Topic::BotDashboard(components) => {
                let components: Vec<&str> = components.iter().map(BotComponent::as_str).collect();
                data.insert("components".to_string(), JsonValue::from(components));
            },
            _ => {},
        }

        ClientMessage::new(format!("subscribe:{}", self.name()), JsonValue::Object(data))
    }

    /// `unsubscribe:<name>`, carrying only the entity id.
    pub fn unsubscribe_message(&self) -> ClientMessage {
        let mut data = Map::new();
        if let Some((key, id)) = self.entity() {
            data.insert(key.to_string(), JsonValue::from(id));
        }
        ClientMessage::new(format!("unsubscribe:{}", self.name()), JsonValue::Object(data))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Parses `orders`, `drop:<id>`, `ticket:<id>`, `product_images:<id>`, ...
///
/// `shop` subscribes to every channel and `bot_dashboard` to every component.
impl FromStr for Topic {
    type Err = StoreLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, id) = match s.trim().split_once(':') {
            Some((name, id)) => (name, Some(id.trim())),
            None => (s.trim(), None),
        };

        let topic = match (name, id) {
            ("orders", None) => Topic::Orders,
            ("drops", None) => Topic::Drops,
            ("drop", Some(id)) if !id.is_empty() => Topic::Drop(id.to_string()),
            ("tickets", None) => Topic::Tickets,
            ("ticket", Some(id)) if !id.is_empty() => Topic::Ticket(id.to_string()),
            ("kpis", None) => Topic::Kpis,
            ("system_health", None) => Topic::SystemHealth,
            ("notifications", None) => Topic::Notifications,
            ("inventory", None) => Topic::Inventory,
            ("shop", None) => Topic::Shop(vec![
                ShopChannel::Products,
                ShopChannel::Orders,
                ShopChannel::Inventory,
                ShopChannel::Customers,
                ShopChannel::Settings,
            ]),
            ("product_images", Some(id)) if !id.is_empty() => Topic::ProductImages(id.to_string()),
            ("bot_dashboard", None) => Topic::BotDashboard(BotComponent::ALL.to_vec()),
            _ => {
                return Err(StoreLinkError::ConfigurationError(format!("Unknown topic '{}'", s)));
            },
        };
        Ok(topic)
    }
}

/// Id list and free-form filters for one subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicFilter {
    pub ids: Vec<String>,
    pub filters: Map<String, JsonValue>,
}

impl TopicFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Merge every field of a JSON object into the filters. Other values are
    /// ignored.
    pub fn with_filters(mut self, filters: JsonValue) -> Self {
        if let JsonValue::Object(map) = filters {
            self.filters.extend(map);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.filters.is_empty()
    }
}

/// Subscriptions to replay after a reconnect, in subscription order.
///
/// Shared between the façade and the connection supervisor.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActiveTopics {
    inner: Arc<Mutex<Vec<(String, ClientMessage)>>>,
}

impl ActiveTopics {
    /// Remember a subscription, replacing an earlier one with the same key.
    pub(crate) fn remember(&self, key: String, message: ClientMessage) {
        let mut topics = self.inner.lock();
        match topics.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = message,
            None => topics.push((key, message)),
        }
    }

    pub(crate) fn forget(&self, key: &str) -> bool {
        let mut topics = self.inner.lock();
        let before = topics.len();
        topics.retain(|(k, _)| k != key);
        topics.len() != before
    }

    pub(crate) fn messages(&self) -> Vec<ClientMessage> {
        self.inner.lock().iter().map(|(_, msg)| msg.clone()).collect()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.inner.lock().iter().map(|(key, _)| key.clone()).collect()
    }
}

/// Named subscribe/unsubscribe operations, borrowed from a client with
/// [`StoreLinkClient::topics`].
///
/// # Example
///
/// ```rust,no_run
/// use store_link::{EventKind, StoreLinkClient, TopicFilter};
///
/// # fn example(client: &StoreLinkClient) {
/// client.on(EventKind::OrderUpdated, |event| println!("{:?}", event.payload()));
/// let accepted = client
///     .topics()
///     .subscribe_to_orders(TopicFilter::new().with_ids(["o-17", "o-18"]));
/// if !accepted {
///     // not connected; subscribe again from a status listener
/// }
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Topics<'a> {
    client: &'a StoreLinkClient,
}

impl<'a> Topics<'a> {
    pub(crate) fn new(client: &'a StoreLinkClient) -> Self {
        Self { client }
    }

    /// Subscribe to `topic`. Returns `false` without sending anything when
    /// the client is not connected.
    pub fn subscribe(&self, topic: Topic, filter: TopicFilter) -> bool {
        if !self.client.is_connected() {
            warn!("[store-link] Cannot subscribe to '{}': not connected", topic);
            return false;
        }

        let message = topic.subscribe_message(&filter);
        debug!("[store-link] Subscribing to '{}'", topic);
        self.client.active_topic_registry().remember(topic.key(), message.clone());
        self.client.send(message.event, message.data, DEFAULT_PRIORITY);
        true
    }

    /// Unsubscribe from `topic`. The topic is always forgotten for replay;
    /// the teardown message is only sent while connected.
    pub fn unsubscribe(&self, topic: Topic) -> bool {
        self.client.active_topic_registry().forget(&topic.key());

        if !self.client.is_connected() {
            warn!("[store-link] Cannot unsubscribe from '{}': not connected", topic);
            return false;
        }

        let message = topic.unsubscribe_message();
        debug!("[store-link] Unsubscribing from '{}'", topic);
        self.client.send(message.event, message.data, DEFAULT_PRIORITY);
        true
    }

    pub fn subscribe_to_orders(&self, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Orders, filter)
    }

    pub fn unsubscribe_from_orders(&self) -> bool {
        self.unsubscribe(Topic::Orders)
    }

    pub fn subscribe_to_drops(&self, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Drops, filter)
    }

    pub fn unsubscribe_from_drops(&self) -> bool {
        self.unsubscribe(Topic::Drops)
    }

    pub fn subscribe_to_drop(&self, drop_id: impl Into<String>, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Drop(drop_id.into()), filter)
    }

    pub fn unsubscribe_from_drop(&self, drop_id: impl Into<String>) -> bool {
        self.unsubscribe(Topic::Drop(drop_id.into()))
    }

    pub fn subscribe_to_tickets(&self, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Tickets, filter)
    }

    pub fn unsubscribe_from_tickets(&self) -> bool {
        self.unsubscribe(Topic::Tickets)
    }

    pub fn subscribe_to_ticket(&self, ticket_id: impl Into<String>, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Ticket(ticket_id.into()), filter)
    }

    pub fn unsubscribe_from_ticket(&self, ticket_id: impl Into<String>) -> bool {
        self.unsubscribe(Topic::Ticket(ticket_id.into()))
    }

    pub fn subscribe_to_kpis(&self, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Kpis, filter)
    }

    pub fn unsubscribe_from_kpis(&self) -> bool {
        self.unsubscribe(Topic::Kpis)
    }

    pub fn subscribe_to_system_health(&self, filter: TopicFilter) -> bool {
        self.subscribe(Topic::SystemHealth, filter)
    }

    pub fn unsubscribe_from_system_health(&self) -> bool {
        self.unsubscribe(Topic::SystemHealth)
    }

    pub fn subscribe_to_notifications(&self, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Notifications, filter)
    }

    pub fn unsubscribe_from_notifications(&self) -> bool {
        self.unsubscribe(Topic::Notifications)
    }

    pub fn subscribe_to_inventory(&self, filter: TopicFilter) -> bool {
        self.subscribe(Topic::Inventory, filter)
    }

    pub fn unsubscribe_from_inventory(&self) -> bool {
        self.unsubscribe(Topic::Inventory)
    }

    pub fn subscribe_to_shop(&self, channels: &[ShopChannel], filter: TopicFilter) -> bool {
        self.subscribe(Topic::Shop(channels.to_vec()), filter)
    }

    pub fn unsubscribe_from_shop(&self) -> bool {
        self.unsubscribe(Topic::Shop(Vec::new()))
    }

    pub fn subscribe_to_product_images(
        &self,
        product_id: impl Into<String>,
        filter: TopicFilter,
    ) -> bool {
        self.subscribe(Topic::ProductImages(product_id.into()), filter)
    }

    pub fn unsubscribe_from_product_images(&self, product_id: impl Into<String>) -> bool {
        self.unsubscribe(Topic::ProductImages(product_id.into()))
    }

    /// One subscription covering every listed dashboard component.
    pub fn subscribe_to_bot_dashboard(
        &self,
        components: &[BotComponent],
        filter: TopicFilter,
    ) -> bool {
        self.subscribe(Topic::BotDashboard(components.to_vec()), filter)
    }

    pub fn unsubscribe_from_bot_dashboard(&self) -> bool {
        self.unsubscribe(Topic::BotDashboard(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_message_merges_ids_and_filters() {
        let filter = TopicFilter::new()
            .with_ids(["o1", "o2"])
            .with_filter("status", "pending");
        let msg = Topic::Orders.subscribe_message(&filter);

        assert_eq!(msg.event, "subscribe:orders");
        assert_eq!(msg.data, json!({ "orderIds": ["o1", "o2"], "status": "pending" }));
    }

    #[test]
    fn test_entity_topics_carry_their_id() {
        let msg = Topic::Drop("d-9".into()).subscribe_message(&TopicFilter::new());
        assert_eq!(msg.event, "subscribe:drop");
        assert_eq!(msg.data, json!({ "dropId": "d-9" }));

        let msg = Topic::ProductImages("p-1".into()).unsubscribe_message();
        assert_eq!(msg.event, "unsubscribe:product_images");
        assert_eq!(msg.data, json!({ "productId": "p-1" }));
    }

    #[test]
    fn test_bot_dashboard_is_one_composite_message() {
        let topic = Topic::BotDashboard(vec![BotComponent::Stats, BotComponent::InviteCodes]);
        let msg = topic.subscribe_message(&TopicFilter::new().with_id("bot-1"));

        assert_eq!(msg.event, "subscribe:bot_dashboard");
        assert_eq!(
            msg.data,
            json!({ "botIds": ["bot-1"], "components": ["stats", "invite_codes"] })
        );
    }

    #[test]
    fn test_shop_channels() {
        let topic = Topic::Shop(vec![ShopChannel::Products, ShopChannel::Inventory]);
        let msg = topic.subscribe_message(&TopicFilter::new());
        assert_eq!(msg.data, json!({ "channels": ["products", "inventory"] }));
        assert_eq!(topic.key(), "shop");
    }

    #[test]
    fn test_with_filters_merges_objects_only() {
        let filter = TopicFilter::new()
            .with_filters(json!({ "severity": "high", "limit": 5 }))
            .with_filters(json!(["ignored"]));
        assert_eq!(filter.filters.len(), 2);
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_topic_keys() {
        assert_eq!(Topic::Orders.key(), "orders");
        assert_eq!(Topic::Ticket("t-4".into()).key(), "ticket:t-4");
        assert_ne!(Topic::Drop("a".into()).key(), Topic::Drop("b".into()).key());
    }

    #[test]
    fn test_topic_from_str() {
        assert_eq!("orders".parse::<Topic>().unwrap(), Topic::Orders);
        assert_eq!("drop:d1".parse::<Topic>().unwrap(), Topic::Drop("d1".into()));
        assert_eq!(
            "bot_dashboard".parse::<Topic>().unwrap(),
            Topic::BotDashboard(BotComponent::ALL.to_vec())
        );
        assert!("drop".parse::<Topic>().is_err());
        assert!("weather".parse::<Topic>().is_err());
    }

    #[test]
    fn test_active_topics_replace_and_forget() {
        let active = ActiveTopics::default();
        active.remember("orders".into(), ClientMessage::new("subscribe:orders", json!({})));
        active.remember("kpis".into(), ClientMessage::new("subscribe:kpis", json!({})));
        active.remember(
            "orders".into(),
            ClientMessage::new("subscribe:orders", json!({ "orderIds": ["o1"] })),
        );

        assert_eq!(active.keys(), vec!["orders", "kpis"]);
        assert_eq!(active.messages()[0].data, json!({ "orderIds": ["o1"] }));

        assert!(active.forget("orders"));
        assert!(!active.forget("orders"));
        assert_eq!(active.keys(), vec!["kpis"]);
    }
}
