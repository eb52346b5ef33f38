//! Offer notification hook.
//!
//! The scheduler does not wait on notifications: agencies answer through
//! `accept`/`reject`, and silence is handled by the offer timer. A notifier
//! only tells the head agency that an offer is waiting.

use foodgrid_state::Donation;
use tracing::info;

/// Outbound notification when an agency becomes head of a queue.
///
/// Delivery is best effort; implementations must not block.
pub trait OfferNotifier: Send + Sync {
    fn offer(&self, agency_id: &str, donation: &Donation);
}

/// Notifier that only records offers in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl OfferNotifier for LogNotifier {
    fn offer(&self, agency_id: &str, donation: &Donation) {
        info!(
            %agency_id,
            donation_id = %donation.id,
            food_type = %donation.food_type,
            quantity = donation.quantity,
            "offer sent"
        );
    }
}
