//! Wire format for launch parameters and remote fire requests.
//!
//! [`LaunchParams`] use a compact bit layout (flags byte, full-precision
//! scalars, centimetre-quantised location, a two-component direction and
//! optional fields that are only written when they differ from their
//! defaults). The surrounding [`FireMessage`] is plain bincode.

use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use super::bitpack::{count_bits, pack_bits, unpack_bits, BitReader, BitWriter};
use crate::error::{BallisticsError, Result};
use crate::events::FireProjectileMessage;
use crate::projectile::Projectile;
use crate::scene::DEFAULT_TRACE_CHANNEL;
use crate::sim::LaunchParams;
use crate::types::{ActorId, ProjectileId, SimulationType};

/// Most actors a launch can ignore on the wire.
pub const MAX_WIRE_IGNORED: usize = 63;
/// Most object types a launch can filter on the wire.
pub const MAX_WIRE_OBJECT_TYPES: usize = 31;

const IGNORED_COUNT_BITS: u32 = count_bits(MAX_WIRE_IGNORED as u64);
const OBJECT_TYPE_COUNT_BITS: u32 = count_bits(MAX_WIRE_OBJECT_TYPES as u64);
const LAUNCH_FLAGS: usize = 3;

/// Largest location component representable on the wire (m).
pub const MAX_WIRE_COORDINATE: f64 = i16::MAX as f64 / 100.0;

fn quantize_cm(value: f64) -> u16 {
    let cm = (value * 100.0).round().clamp(i16::MIN as f64, i16::MAX as f64);
    cm as i16 as u16
}

fn dequantize_cm(raw: u16) -> f64 {
    f64::from(raw as i16) / 100.0
}

fn quantize_unit(value: f64) -> u16 {
    (value.clamp(-1.0, 1.0) * f64::from(i16::MAX)).round() as i16 as u16
}

fn dequantize_unit(raw: u16) -> f64 {
    (f64::from(raw as i16) / f64::from(i16::MAX)).clamp(-1.0, 1.0)
}

impl LaunchParams {
    /// Encodes these parameters into the compact wire layout.
    ///
    /// The owner's velocity is not transmitted; receivers see it as zero.
    ///
    /// # Returns
    /// The packed bytes, or [`BallisticsError::Wire`] when the ignore list
    /// or object-type list is too long for its count field.
    ///
    /// # Example
    /// ```
    /// use bevy::math::DVec3;
    /// use terminal_ballistics::sim::LaunchParams;
    ///
    /// let launch = LaunchParams::new(DVec3::new(1.0, 2.0, 3.0), DVec3::X).with_speed(820.0);
    /// let decoded = LaunchParams::decode(&launch.encode().unwrap()).unwrap();
    /// assert_eq!(decoded.projectile_speed, 820.0);
    /// ```
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        if self.to_ignore.len() > MAX_WIRE_IGNORED {
            return Err(BallisticsError::Wire(format!(
                "{} ignored actors exceed the wire limit of {MAX_WIRE_IGNORED}",
                self.to_ignore.len()
            )));
        }
        if self.object_types.len() > MAX_WIRE_OBJECT_TYPES {
            return Err(BallisticsError::Wire(format!(
                "{} object types exceed the wire limit of {MAX_WIRE_OBJECT_TYPES}",
                self.object_types.len()
            )));
        }

        let mut writer = BitWriter::new();
        writer.write_u8(pack_bits(&[self.ignore_owner, self.add_owner_velocity, self.force_no_tracer])?);

        writer.write_f64(self.projectile_speed);
        writer.write_f64(self.effective_range);
        writer.write_f64(self.timescale);
        writer.write_f64(self.owner_ignore_distance);

        for component in self.location.to_array() {
            writer.write_u16(quantize_cm(component));
        }

        let direction = self.direction.normalize_or(DVec3::X);
        writer.write_u16(quantize_unit(direction.x));
        writer.write_u16(quantize_unit(direction.y));
        writer.write_bit(direction.z < 0.0);

        writer.write_bits(self.to_ignore.len() as u64, IGNORED_COUNT_BITS);
        for actor in &self.to_ignore {
            writer.write_u64(actor.0);
        }
        writer.write_bits(self.object_types.len() as u64, OBJECT_TYPE_COUNT_BITS);
        for object_type in &self.object_types {
            writer.write_u8(*object_type);
        }

        let channel = (self.trace_channel != DEFAULT_TRACE_CHANNEL).then_some(self.trace_channel);
        writer.write_bit(channel.is_some());
        if let Some(channel) = channel {
            writer.write_u8(channel);
        }
        for actor in [self.owner, self.instigator] {
            writer.write_bit(actor.is_some());
            if let Some(actor) = actor {
                writer.write_u64(actor.0);
            }
        }
        let realtime = self.simulation_type != SimulationType::default();
        writer.write_bit(realtime);
        if realtime {
            writer.write_u8(self.simulation_type.to_u8());
        }

        Ok(writer.into_bytes())
    }

    /// Decodes parameters written by [`LaunchParams::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(bytes);
        let flags = unpack_bits(reader.read_u8()?, LAUNCH_FLAGS);

        let projectile_speed = reader.read_f64()?;
        let effective_range = reader.read_f64()?;
        let timescale = reader.read_f64()?;
        let owner_ignore_distance = reader.read_f64()?;

        let location = DVec3::new(
            dequantize_cm(reader.read_u16()?),
            dequantize_cm(reader.read_u16()?),
            dequantize_cm(reader.read_u16()?),
        );

        let x = dequantize_unit(reader.read_u16()?);
        let y = dequantize_unit(reader.read_u16()?);
        let z_magnitude = (1.0 - x * x - y * y).max(0.0).sqrt();
        let z = if reader.read_bit()? { -z_magnitude } else { z_magnitude };

        let ignored = reader.read_bits(IGNORED_COUNT_BITS)? as usize;
        let to_ignore = (0..ignored)
            .map(|_| reader.read_u64().map(ActorId))
            .collect::<Result<Vec<_>>>()?;
        let object_count = reader.read_bits(OBJECT_TYPE_COUNT_BITS)? as usize;
        let object_types = (0..object_count).map(|_| reader.read_u8()).collect::<Result<Vec<_>>>()?;

        let trace_channel = if reader.read_bit()? { reader.read_u8()? } else { DEFAULT_TRACE_CHANNEL };
        let owner = if reader.read_bit()? { Some(ActorId(reader.read_u64()?)) } else { None };
        let instigator = if reader.read_bit()? { Some(ActorId(reader.read_u64()?)) } else { None };
        let simulation_type = if reader.read_bit()? {
            let raw = reader.read_u8()?;
            SimulationType::from_u8(raw)
                .ok_or_else(|| BallisticsError::Wire(format!("unknown simulation type {raw}")))?
        } else {
            SimulationType::default()
        };

        let launch = LaunchParams {
            projectile_speed,
            effective_range,
            timescale,
            owner_ignore_distance,
            location,
            direction: DVec3::new(x, y, z).normalize_or(DVec3::X),
            to_ignore,
            object_types,
            trace_channel,
            owner,
            instigator,
            owner_velocity: DVec3::ZERO,
            ignore_owner: flags[0],
            add_owner_velocity: flags[1],
            force_no_tracer: flags[2],
            simulation_type,
        };
        launch
            .validate()
            .map_err(|e| BallisticsError::Wire(format!("decoded launch parameters are invalid: {e}")))?;
        Ok(launch)
    }
}

/// A fire request as sent between peers.
///
/// Ids are assigned before sending so every peer simulates the same
/// projectile under the same id.
///
/// # Fields
/// * `id` - Projectile id shared by all peers
/// * `projectile` - What was fired
/// * `launch` - Launch parameters in the compact layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireMessage {
    pub id: ProjectileId,
    pub projectile: Projectile,
    pub launch: Vec<u8>,
}

impl FireMessage {
    /// Packs a local fire request, assigning an id if it has none.
    pub fn from_fire(message: &FireProjectileMessage) -> Result<Self> {
        Ok(Self {
            id: message.id.or_generate(),
            projectile: message.projectile.clone(),
            launch: message.launch.encode()?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Unpacks into a request the local engine can fire.
    pub fn into_fire_message(self) -> Result<FireProjectileMessage> {
        let launch = LaunchParams::decode(&self.launch)?;
        Ok(FireProjectileMessage::new(self.projectile, launch).with_id(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projectile::BulletPreset;

    fn sample_launch() -> LaunchParams {
        LaunchParams::new(DVec3::new(12.345, -3.21, 1.5), DVec3::new(1.0, 0.2, -0.1))
            .with_speed(820.0)
            .with_range(600.0)
            .with_ignored_actor(ActorId(42))
            .with_owner(ActorId(7), DVec3::new(3.0, 0.0, 0.0))
    }

    #[test]
    fn test_launch_survives_the_wire() {
        let launch = sample_launch();
        let decoded = LaunchParams::decode(&launch.encode().unwrap()).unwrap();

        assert_eq!(decoded.projectile_speed, 820.0);
        assert_eq!(decoded.effective_range, 600.0);
        assert!((decoded.location - launch.location).abs().max_element() <= 0.005 + 1e-9);
        let angle = decoded.direction.angle_between(launch.direction.normalize());
        assert!(angle < 1e-3, "direction drifted by {angle} rad");
        assert_eq!(decoded.to_ignore, vec![ActorId(42)]);
        assert_eq!(decoded.owner, Some(ActorId(7)));
        assert_eq!(decoded.instigator, None);
        assert_eq!(decoded.owner_velocity, DVec3::ZERO);
        assert!(decoded.ignore_owner && decoded.add_owner_velocity && !decoded.force_no_tracer);
    }

    #[test]
    fn test_downward_direction_keeps_its_sign() {
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::new(0.0, 0.0, -1.0));
        let decoded = LaunchParams::decode(&launch.encode().unwrap()).unwrap();
        assert!((decoded.direction - DVec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn test_location_saturates() {
        let launch = LaunchParams::new(DVec3::new(1000.0, -1000.0, 0.0), DVec3::X);
        let decoded = LaunchParams::decode(&launch.encode().unwrap()).unwrap();
        assert_eq!(decoded.location.x, MAX_WIRE_COORDINATE);
        assert_eq!(decoded.location.y, -327.68);
    }

    #[test]
    fn test_defaults_are_not_written() {
        let plain = LaunchParams::default().encode().unwrap();
        let custom = LaunchParams::default()
            .with_trace_channel(3)
            .with_simulation_type(SimulationType::Realtime)
            .encode()
            .unwrap();
        assert!(plain.len() < custom.len());

        let decoded = LaunchParams::decode(&custom).unwrap();
        assert_eq!(decoded.trace_channel, 3);
        assert_eq!(decoded.simulation_type, SimulationType::Realtime);
        assert_eq!(LaunchParams::decode(&plain).unwrap().trace_channel, DEFAULT_TRACE_CHANNEL);
    }

    #[test]
    fn test_too_many_ignored_actors_is_an_error() {
        let mut launch = LaunchParams::default();
        launch.to_ignore = (0..64).map(ActorId).collect();
        assert!(matches!(launch.encode(), Err(BallisticsError::Wire(_))));

        launch.to_ignore.truncate(MAX_WIRE_IGNORED);
        assert_eq!(LaunchParams::decode(&launch.encode().unwrap()).unwrap().to_ignore.len(), 63);
    }

    #[test]
    fn test_too_many_object_types_is_an_error() {
        let launch = LaunchParams::default().with_object_types(vec![1; 32]);
        assert!(matches!(launch.encode(), Err(BallisticsError::Wire(_))));
    }

    #[test]
    fn test_truncated_buffer_is_an_error() {
        let bytes = sample_launch().encode().unwrap();
        assert!(LaunchParams::decode(&bytes[..bytes.len() / 2]).is_err());
        assert!(LaunchParams::decode(&[]).is_err());
    }

    #[test]
    fn test_fire_message_keeps_id_and_projectile() {
        let local = FireProjectileMessage::new(BulletPreset::Nato556x45.into(), sample_launch());
        let wire = FireMessage::from_fire(&local).unwrap();
        assert!(!wire.id.is_none());

        let bytes = wire.to_bytes().unwrap();
        let remote = FireMessage::from_bytes(&bytes).unwrap().into_fire_message().unwrap();
        assert_eq!(remote.id, wire.id);
        assert_eq!(remote.projectile, local.projectile);
        assert_eq!(remote.launch.projectile_speed, 820.0);
    }
}
