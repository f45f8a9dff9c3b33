//! The relay engine: endpoint registry, message fan-out, mutation and
//! reaction propagation, the banshare workflow, and network membership.
//!
//! Everything here is platform-agnostic; the chat platform is consumed
//! through the [`platform::ChatPlatform`] trait and injected into
//! [`relay::Relay`].

pub mod banshare;
pub mod broadcast;
pub mod error;
pub mod membership;
pub mod mutation;
pub mod platform;
pub mod reactions;
pub mod registry;
pub mod relay;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::CoreError;
pub use platform::{ChatPlatform, PlatformError};
pub use relay::{Relay, RelaySettings};

#[cfg(test)]
mod end_to_end {
    use crate::test_support::{add_endpoint, inbound, test_relay};
    use lattice_models::channel::ChannelKind;
    use lattice_models::event::PlatformEvent;

    // The full message lifecycle, driven through the public event entry
    // point: post, edit, then moderator delete.
    #[tokio::test]
    async fn post_edit_delete_lifecycle() {
        let (relay, platform) = test_relay().await;
        add_endpoint(&relay, 1, 10, 100, ChannelKind::General).await;
        add_endpoint(&relay, 2, 20, 200, ChannelKind::General).await;
        add_endpoint(&relay, 3, 30, 300, ChannelKind::General).await;

        relay
            .clone()
            .dispatch(PlatformEvent::MessageCreated(inbound(10, 100, 900, 42, "hello")))
            .await;
        let logical_id = lattice_db::messages::find_logical_by_source(&relay.db, 100, 900)
            .await
            .unwrap()
            .expect("message relayed");
        let copies = lattice_db::messages::list_copies(&relay.db, logical_id)
            .await
            .unwrap();
        assert_eq!(copies.len(), 2);
        // The origin original was removed after relaying.
        assert_eq!(platform.deleted.lock().unwrap().len(), 1);

        relay
            .clone()
            .dispatch(PlatformEvent::MessageEdited {
                channel_id: 100,
                physical_id: 900,
                editor_id: 42,
                content: "hello there".to_string(),
            })
            .await;
        assert_eq!(platform.edits_to("cred-2").len(), 1);
        assert_eq!(platform.edits_to("cred-3").len(), 1);

        platform.moderators.insert((10, 555));
        relay
            .clone()
            .dispatch(PlatformEvent::MessageDeleted {
                channel_id: 100,
                physical_id: 900,
                actor_id: Some(555),
            })
            .await;
        assert!(
            lattice_db::messages::find_logical_by_source(&relay.db, 100, 900)
                .await
                .unwrap()
                .is_none()
        );
        assert!(lattice_db::messages::list_copies(&relay.db, logical_id)
            .await
            .unwrap()
            .is_empty());
        // Both sibling copies were deleted on the platform.
        let deleted = platform.deleted.lock().unwrap();
        assert!(deleted.iter().any(|(cred, _)| cred == "cred-2"));
        assert!(deleted.iter().any(|(cred, _)| cred == "cred-3"));
    }
}
