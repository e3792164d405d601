//! Outbound notifications raised by zone transitions.

use super::Traveler;
use crate::config::ZoneConfig;
use crate::types::ZoneId;
use tracing::info;

/// Receives the welcome message sent when a traveler arrives in a zone.
///
/// The UI layer implements this to show the zone banner; servers forward it
/// to the client connection.
pub trait ZoneNotifier: Send + Sync {
    fn zone_welcome(&self, traveler: &Traveler, zone_id: &ZoneId, config: &ZoneConfig);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl ZoneNotifier for LogNotifier {
    fn zone_welcome(&self, traveler: &Traveler, zone_id: &ZoneId, config: &ZoneConfig) {
        info!(
            "👋 Player {} entered {} ({}) at ({:.0}, {:.0}): {}",
            traveler.id, config.name, zone_id, traveler.position.x, traveler.position.y, config.description
        );
    }
}
