//! Alert notification dispatch.
//!
//! Composes the outgoing alert message (text plus map and live-audio links)
//! and fans it out to the selected contacts through the injected delivery
//! gateway. Dispatch never fails as a whole: per-contact delivery errors are
//! logged and surfaced as notices, and the outcome reports what got through.

use crate::config::DispatchConfig;
use crate::contacts::{Contact, ContactDirectory};
use crate::error::{FailureKind, SosResult};
use crate::location::{Location, LocationTracker};
use crate::notice::NoticeHub;
use async_trait::async_trait;
use std::sync::Arc;

/// External delivery channel (SMS, push, or similar).
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Deliver one message to one contact.
    async fn send(&self, contact: &Contact, message: &str) -> SosResult<()>;
}

/// Result of one dispatch pass.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Contacts the message was addressed to.
    pub contacts: Vec<Contact>,
    /// Location resolved at dispatch time, if any.
    pub location: Option<Location>,
    /// The fully composed message as sent.
    pub full_message: String,
    /// How many deliveries succeeded.
    pub delivered: usize,
}

/// Fans alert messages out to emergency contacts.
pub struct NotificationDispatcher {
    gateway: Arc<dyn DeliveryGateway>,
    contacts: Arc<ContactDirectory>,
    location: Arc<LocationTracker>,
    config: DispatchConfig,
    notices: NoticeHub,
}

impl NotificationDispatcher {
    pub fn new(
        gateway: Arc<dyn DeliveryGateway>,
        contacts: Arc<ContactDirectory>,
        location: Arc<LocationTracker>,
        config: DispatchConfig,
        notices: NoticeHub,
    ) -> Self {
        Self {
            gateway,
            contacts,
            location,
            config,
            notices,
        }
    }

    /// Dispatch an alert to the selected contacts.
    ///
    /// `ids` of `None` means all cached contacts; an explicit list selects
    /// the intersection with the cache. The location lookup is best-effort
    /// and delivery failures never abort the remaining sends.
    pub async fn dispatch(
        &self,
        message: &str,
        ids: Option<&[String]>,
        stream_url: Option<&str>,
    ) -> DispatchOutcome {
        let recipients = self.contacts.filter(ids);
        if recipients.is_empty() {
            tracing::warn!("Dispatch requested but no contacts selected");
            self.notices.publish(
                FailureKind::NotFound,
                "No emergency contacts to notify",
            );
        }

        let location = self.location.get_current().await;
        let full_message = self.compose(message, location.as_ref(), stream_url);

        let mut delivered = 0;
        for contact in &recipients {
            match self.gateway.send(contact, &full_message).await {
                Ok(()) => {
                    tracing::info!("Alert delivered to {}", contact.name);
                    delivered += 1;
                }
                Err(e) => {
                    tracing::error!("Alert delivery to {} failed: {}", contact.name, e);
                    self.notices.publish(
                        e.kind(),
                        format!("Could not reach {}", contact.name),
                    );
                }
            }
        }

        tracing::info!(
            "Dispatch complete: {}/{} contact(s) reached",
            delivered,
            recipients.len()
        );

        DispatchOutcome {
            contacts: recipients,
            location,
            full_message,
            delivered,
        }
    }

    /// Compose the outgoing message from its parts.
    ///
    /// The map link is appended only when a location is known, the live
    /// audio link only when a stream was opened for this session.
    fn compose(
        &self,
        message: &str,
        location: Option<&Location>,
        stream_url: Option<&str>,
    ) -> String {
        let mut full = message.to_string();
        if let Some(loc) = location {
            full.push_str(&format!(
                "\nMy location: {}{},{}",
                self.config.map_link_base, loc.lat, loc.lng
            ));
        }
        if let Some(url) = stream_url {
            full.push_str(&format!("\nLive audio: {}", url));
        }
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationConfig;
    use crate::contacts::derive_initials;
    use crate::database::RecordStore;
    use crate::error::SosError;
    use crate::history::HistoryRecord;
    use crate::location::{Position, PositionError, PositionOptions, PositionSource};
    use crate::voice::codewords::CodeWord;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    struct FakeGateway {
        reject: Vec<String>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeGateway {
        fn ok() -> Self {
            Self {
                reject: Vec::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn rejecting(ids: &[&str]) -> Self {
            Self {
                reject: ids.iter().map(|s| s.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DeliveryGateway for FakeGateway {
        async fn send(&self, contact: &Contact, message: &str) -> SosResult<()> {
            if self.reject.contains(&contact.id) {
                return Err(SosError::Transport("carrier rejected".into()));
            }
            self.sent
                .lock()
                .push((contact.id.clone(), message.to_string()));
            Ok(())
        }
    }

    struct StoreWithContacts {
        contacts: Vec<Contact>,
    }

    #[async_trait]
    impl RecordStore for StoreWithContacts {
        async fn contacts_for(&self, _user_id: &str) -> SosResult<Vec<Contact>> {
            Ok(self.contacts.clone())
        }

        async fn codewords_for(&self, _user_id: &str) -> SosResult<Vec<CodeWord>> {
            Ok(Vec::new())
        }

        async fn insert_history(&self, _record: &HistoryRecord) -> SosResult<()> {
            Ok(())
        }

        async fn history_for(&self, _user_id: &str) -> SosResult<Vec<HistoryRecord>> {
            Ok(Vec::new())
        }
    }

    /// Position source with a single fixed answer, or none at all.
    struct FixedSource {
        position: Option<Position>,
    }

    #[async_trait]
    impl PositionSource for FixedSource {
        async fn fetch(&self, _options: PositionOptions) -> Result<Position, PositionError> {
            self.position
                .clone()
                .ok_or(PositionError::Unavailable("no fix".into()))
        }

        fn watch(
            &self,
            _options: PositionOptions,
        ) -> Result<mpsc::Receiver<Result<Position, PositionError>>, PositionError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
            phone: "+447700900000".to_string(),
            initials: derive_initials(name),
        }
    }

    async fn dispatcher(
        contacts: Vec<Contact>,
        gateway: Arc<FakeGateway>,
        position: Option<Position>,
    ) -> (NotificationDispatcher, NoticeHub) {
        let store = Arc::new(StoreWithContacts { contacts });
        let directory = Arc::new(ContactDirectory::new(store));
        directory.refresh("u1").await.unwrap();

        let notices = NoticeHub::new();
        let tracker = Arc::new(LocationTracker::new(
            Arc::new(FixedSource { position }),
            LocationConfig::default(),
            notices.clone(),
        ));

        let dispatcher = NotificationDispatcher::new(
            gateway,
            directory,
            tracker,
            DispatchConfig::default(),
            notices.clone(),
        );
        (dispatcher, notices)
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_contacts() {
        let gateway = Arc::new(FakeGateway::ok());
        let (dispatcher, _) = dispatcher(
            vec![contact("a", "Ada"), contact("b", "Brian")],
            Arc::clone(&gateway),
            Some(Position { lat: 51.5, lng: -0.12 }),
        )
        .await;

        let outcome = dispatcher.dispatch("Help!", None, Some("https://live/abc")).await;

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.contacts.len(), 2);
        assert!(outcome.location.is_some());
        assert!(outcome.full_message.starts_with("Help!"));
        assert!(outcome.full_message.contains("51.5,-0.12"));
        assert!(outcome.full_message.contains("https://live/abc"));
        assert_eq!(gateway.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_without_location_omits_map_link() {
        let gateway = Arc::new(FakeGateway::ok());
        let (dispatcher, _) =
            dispatcher(vec![contact("a", "Ada")], Arc::clone(&gateway), None).await;

        let outcome = dispatcher.dispatch("Help!", None, None).await;

        assert!(outcome.location.is_none());
        assert!(!outcome.full_message.contains("My location"));
        assert!(!outcome.full_message.contains("Live audio"));
        assert_eq!(outcome.delivered, 1);
    }

    #[tokio::test]
    async fn test_partial_delivery_failure_continues() {
        let gateway = Arc::new(FakeGateway::rejecting(&["a"]));
        let (dispatcher, notices) = dispatcher(
            vec![contact("a", "Ada"), contact("b", "Brian")],
            Arc::clone(&gateway),
            Some(Position { lat: 0.0, lng: 0.0 }),
        )
        .await;
        let mut rx = notices.subscribe();

        let outcome = dispatcher.dispatch("Help!", None, None).await;

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.contacts.len(), 2);
        let notice = rx.recv().await.unwrap();
        assert!(notice.message.contains("Ada"));
    }

    #[tokio::test]
    async fn test_empty_selection_raises_notice() {
        let gateway = Arc::new(FakeGateway::ok());
        let (dispatcher, notices) =
            dispatcher(vec![contact("a", "Ada")], Arc::clone(&gateway), None).await;
        let mut rx = notices.subscribe();

        let outcome = dispatcher.dispatch("Help!", Some(&[]), None).await;

        assert_eq!(outcome.delivered, 0);
        assert!(outcome.contacts.is_empty());
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.kind, FailureKind::NotFound);
        assert!(gateway.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_subset_is_honoured() {
        let gateway = Arc::new(FakeGateway::ok());
        let (dispatcher, _) = dispatcher(
            vec![contact("a", "Ada"), contact("b", "Brian")],
            Arc::clone(&gateway),
            None,
        )
        .await;

        let outcome = dispatcher
            .dispatch("Help!", Some(&["b".to_string()]), None)
            .await;

        assert_eq!(outcome.contacts.len(), 1);
        assert_eq!(outcome.contacts[0].id, "b");
        assert_eq!(gateway.sent.lock()[0].0, "b");
    }
}
