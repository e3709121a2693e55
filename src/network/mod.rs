//! Replication of fire requests between peers.
//!
//! This module is only available with the `netcode` feature flag. It is
//! transport-agnostic: outgoing requests become [`OutgoingFireMessage`]s
//! carrying encoded bytes, and bytes received from a peer are fed back in as
//! [`RemoteFireMessage`]s. Both sides end up firing the same projectile id
//! locally, so hit and completion events line up across peers.

use bevy::ecs::message::{Message, MessageReader, MessageWriter};
use bevy::prelude::*;

pub mod bitpack;
pub mod protocol;

use crate::events::FireProjectileMessage;
use protocol::FireMessage;

/// Fire locally and replicate to peers.
#[derive(Message, Clone)]
pub struct ReplicatedFireMessage(pub FireProjectileMessage);

/// Encoded fire request ready to be sent to peers.
#[derive(Message, Clone, Debug)]
pub struct OutgoingFireMessage(pub Vec<u8>);

/// Encoded fire request received from a peer.
#[derive(Message, Clone, Debug)]
pub struct RemoteFireMessage(pub Vec<u8>);

/// Network ballistics plugin.
///
/// # Systems
/// - `send_replicated_fires` - Encodes local requests and fires them locally
/// - `receive_remote_fires` - Decodes peer requests into local fire requests
pub struct BallisticsNetworkPlugin;

impl Plugin for BallisticsNetworkPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<ReplicatedFireMessage>()
            .add_message::<OutgoingFireMessage>()
            .add_message::<RemoteFireMessage>()
            .add_message::<FireProjectileMessage>()
            .add_systems(
                PreUpdate,
                (send_replicated_fires, receive_remote_fires),
            );
    }
}

fn send_replicated_fires(
    mut requests: MessageReader<ReplicatedFireMessage>,
    mut outgoing: MessageWriter<OutgoingFireMessage>,
    mut fire: MessageWriter<FireProjectileMessage>,
) {
    for ReplicatedFireMessage(request) in requests.read() {
        let wire = match FireMessage::from_fire(request) {
            Ok(wire) => wire,
            Err(e) => {
                warn!("Dropping fire request that cannot be replicated: {}", e);
                continue;
            }
        };
        match wire.to_bytes() {
            Ok(bytes) => {
                fire.write(request.clone().with_id(wire.id));
                outgoing.write(OutgoingFireMessage(bytes));
            }
            Err(e) => warn!("Failed to serialize fire request {:?}: {}", wire.id, e),
        }
    }
}

fn receive_remote_fires(
    mut remote: MessageReader<RemoteFireMessage>,
    mut fire: MessageWriter<FireProjectileMessage>,
) {
    for RemoteFireMessage(bytes) in remote.read() {
        match FireMessage::from_bytes(bytes).and_then(FireMessage::into_fire_message) {
            Ok(message) => {
                debug!("Received remote fire request {:?}", message.id);
                fire.write(message);
            }
            Err(e) => warn!("Ignoring malformed remote fire request: {}", e),
        }
    }
}
