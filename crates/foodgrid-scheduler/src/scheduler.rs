//! The allocation scheduler and its per-donation offer queues.
//!
//! `Scheduler` is the allocation state machine. It:
//! - Ranks agencies for a `Ready` donation and offers it to the head
//! - Runs one background offer task per `Allocated` donation
//! - Applies accept/reject calls from the head-of-queue agency
//! - Persists every donation transition through the gateway
//!
//! Lock order is per-donation state first, slot map second. The slot map is
//! never held across a persistence call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use foodgrid_placement::rank;
use foodgrid_state::*;

use crate::cache::RequirementCache;
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::notify::{LogNotifier, OfferNotifier};
use crate::queue::{Advance, OfferQueue};

/// Outcome of an `allocate` call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Allocation {
    /// The donation is `Allocated` and `agency_id` holds the offer.
    Offered { agency_id: AgencyId, queue_len: usize },
    /// No agency could be ranked; the donation stays `Ready`.
    NoCandidates,
}

/// Read-only view of a live offer queue.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OfferSnapshot {
    pub donation_id: DonationId,
    pub head: AgencyId,
    /// Agencies in offer order, head first.
    pub queue: Vec<AgencyId>,
    /// Time left before the head's offer expires.
    pub remaining: Duration,
}

/// Mutable per-donation state, guarded by its own mutex.
struct OfferState {
    /// Latest record as written to the gateway.
    donation: Donation,
    queue: OfferQueue,
    /// Set once the queue is exhausted or accepted. A closed state is never
    /// mutated again.
    closed: bool,
}

/// Per-donation scheduling slot held in memory.
struct OfferSlot {
    /// Distinguishes successive slots for the same donation.
    epoch: u64,
    state: Arc<Mutex<OfferState>>,
    /// Handle to the background offer task.
    handle: JoinHandle<()>,
    /// Shutdown signal for the offer task.
    shutdown_tx: watch::Sender<bool>,
}

/// Shared between the scheduler handle and its offer tasks.
struct Inner<G> {
    gateway: Arc<G>,
    config: SchedulerConfig,
    notifier: Arc<dyn OfferNotifier>,
    /// Active queues: donation_id → slot.
    slots: RwLock<HashMap<DonationId, OfferSlot>>,
    /// Source of slot epochs.
    next_epoch: AtomicU64,
}

/// The allocation scheduler.
///
/// Constructed once by the composition root and passed to callers
/// explicitly; it holds no global state.
pub struct Scheduler<G> {
    inner: Arc<Inner<G>>,
    cache: RequirementCache,
}

impl<G> Scheduler<G>
where
    G: PersistenceGateway + 'static,
{
    /// Create a new scheduler that reports offers through [`LogNotifier`].
    pub fn new(gateway: Arc<G>, cache: RequirementCache, config: SchedulerConfig) -> Self {
        Self::with_parts(gateway, cache, config, Arc::new(LogNotifier))
    }

    /// Create a new scheduler with a custom offer notifier.
    pub fn with_parts(
        gateway: Arc<G>,
        cache: RequirementCache,
        config: SchedulerConfig,
        notifier: Arc<dyn OfferNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                config,
                notifier,
                slots: RwLock::new(HashMap::new()),
                next_epoch: AtomicU64::new(1),
            }),
            cache,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.config
    }

    pub fn cache(&self) -> &RequirementCache {
        &self.cache
    }

    pub(crate) fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    /// Record a created or changed requirement for future rankings.
    pub async fn update_requirement(&self, requirement: &Requirement) {
        self.cache.update(requirement).await;
    }

    /// Forget a deleted requirement. Returns true if it was cached.
    pub async fn remove_requirement(&self, agency_id: &str, food_type: FoodType) -> bool {
        self.cache.remove(agency_id, food_type).await
    }

    /// Rank `agencies` for a `Ready` donation and offer it to the head.
    ///
    /// With no rankable agency the donation is left untouched and
    /// [`Allocation::NoCandidates`] is returned.
    pub async fn allocate(
        &self,
        donation: Donation,
        agencies: &[Agency],
    ) -> SchedulerResult<Allocation> {
        if donation.status != DonationStatus::Ready || self.is_active(&donation.id).await {
            return Err(SchedulerError::InvalidStateTransition {
                donation_id: donation.id,
                status: donation.status,
            });
        }

        let needs = self.cache.snapshot().await;
        let ranked = rank(&donation, agencies, &needs)?;
        let Some(queue) =
            OfferQueue::new(ranked, Instant::now(), self.inner.config.offer_window())?
        else {
            info!(donation_id = %donation.id, "no candidate agencies, donation stays ready");
            return Ok(Allocation::NoCandidates);
        };

        let head = queue.head().cloned().unwrap_or_default();
        let queue_len = queue.len();
        let donation_id = donation.id.clone();

        let mut record = donation;
        record.status = DonationStatus::Allocated;
        record.agency_id = Some(head.clone());

        let state = Arc::new(Mutex::new(OfferState {
            donation: record.clone(),
            queue,
            closed: false,
        }));
        // Hold the state until the record is persisted; the offer task
        // blocks on it before its first deadline check.
        let mut guard = state.clone().lock_owned().await;

        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        {
            let mut slots = self.inner.slots.write().await;
            if slots.contains_key(&donation_id) {
                return Err(SchedulerError::InvalidStateTransition {
                    donation_id,
                    status: DonationStatus::Allocated,
                });
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(run_offer_loop(
                self.inner.clone(),
                donation_id.clone(),
                epoch,
                state.clone(),
                shutdown_rx,
            ));
            slots.insert(
                donation_id.clone(),
                OfferSlot {
                    epoch,
                    state,
                    handle,
                    shutdown_tx,
                },
            );
        }

        if let Err(e) = self.inner.gateway.save_donation(&record) {
            guard.closed = true;
            drop(guard);
            self.inner.release(&donation_id, epoch).await;
            return Err(e.into());
        }

        self.inner.notifier.offer(&head, &record);
        drop(guard);

        info!(%donation_id, agency_id = %head, queue_len, "donation allocated");
        Ok(Allocation::Offered {
            agency_id: head,
            queue_len,
        })
    }

    /// Accept the offer on behalf of `agency_id`.
    ///
    /// Returns `false` without changing anything unless the donation has a
    /// live queue whose head is `agency_id`.
    pub async fn accept(&self, donation_id: &str, agency_id: &str) -> SchedulerResult<bool> {
        let Some((epoch, state)) = self.slot_state(donation_id).await else {
            return self.inactive_response(donation_id);
        };

        let mut st = state.lock().await;
        if st.closed || !st.queue.is_head(agency_id) {
            debug!(%donation_id, %agency_id, "accept from agency not at head of queue");
            return Ok(false);
        }

        let mut record = st.donation.clone();
        record.status = DonationStatus::Accepted;
        record.agency_id = Some(agency_id.to_string());
        self.inner.gateway.save_donation(&record)?;

        st.donation = record;
        st.closed = true;
        self.inner.release(donation_id, epoch).await;
        drop(st);

        info!(%donation_id, %agency_id, "offer accepted");
        Ok(true)
    }

    /// Decline the offer on behalf of `agency_id` and move to the next agency.
    ///
    /// Returns `false` without changing anything unless `agency_id` is the
    /// current head.
    pub async fn reject(&self, donation_id: &str, agency_id: &str) -> SchedulerResult<bool> {
        let Some((epoch, state)) = self.slot_state(donation_id).await else {
            return self.inactive_response(donation_id);
        };

        let mut st = state.lock().await;
        if st.closed || !st.queue.is_head(agency_id) {
            debug!(%donation_id, %agency_id, "reject from agency not at head of queue");
            return Ok(false);
        }

        let step = next_step(&st, Instant::now(), self.inner.config.offer_window())?;
        self.inner.gateway.save_donation(&step.record)?;

        info!(%donation_id, %agency_id, "offer rejected");
        self.inner.commit(&mut st, step, epoch).await;
        Ok(true)
    }

    /// Current queue for a donation, if it has a live offer.
    pub async fn offer(&self, donation_id: &str) -> Option<OfferSnapshot> {
        let (_, state) = self.slot_state(donation_id).await?;
        let st = state.lock().await;
        if st.closed {
            return None;
        }
        let head = st.queue.head()?.clone();
        Some(OfferSnapshot {
            donation_id: donation_id.to_string(),
            head,
            queue: st.queue.agencies(),
            remaining: st.queue.deadline().saturating_duration_since(Instant::now()),
        })
    }

    /// IDs of donations with a live offer queue.
    pub async fn active_donations(&self) -> Vec<DonationId> {
        let slots = self.inner.slots.read().await;
        slots.keys().cloned().collect()
    }

    /// Check if a donation has a live offer queue.
    pub async fn is_active(&self, donation_id: &str) -> bool {
        let slots = self.inner.slots.read().await;
        slots.contains_key(donation_id)
    }

    /// Drop the live queue of one donation and stop its offer task without
    /// touching the persisted record. Returns false if there was none.
    pub async fn cancel(&self, donation_id: &str) -> bool {
        let Some((epoch, state)) = self.slot_state(donation_id).await else {
            return false;
        };
        let mut st = state.lock().await;
        if st.closed {
            return false;
        }
        st.closed = true;
        self.inner.release(donation_id, epoch).await;
        info!(%donation_id, "offer queue cancelled");
        true
    }

    /// Stop every offer task (for graceful shutdown). Persisted records keep
    /// their last state; the next startup re-allocates them.
    pub async fn shutdown(&self) {
        let mut slots = self.inner.slots.write().await;
        for (id, slot) in slots.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(donation_id = %id, "offer task stopped");
        }
        info!("all offer tasks stopped");
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn slot_state(&self, donation_id: &str) -> Option<(u64, Arc<Mutex<OfferState>>)> {
        let slots = self.inner.slots.read().await;
        slots
            .get(donation_id)
            .map(|slot| (slot.epoch, slot.state.clone()))
    }

    /// `false` for a known donation without a queue, an error otherwise.
    fn inactive_response(&self, donation_id: &str) -> SchedulerResult<bool> {
        match self.inner.gateway.load_donation(donation_id)? {
            Some(donation) => {
                debug!(%donation_id, status = %donation.status, "no live offer for donation");
                Ok(false)
            }
            None => Err(SchedulerError::DonationNotFound(donation_id.to_string())),
        }
    }
}

/// A computed but not yet applied queue advance.
struct Step {
    queue: OfferQueue,
    record: Donation,
    advance: Advance,
}

/// Drop the head of `st`'s queue without mutating it.
fn next_step(st: &OfferState, now: Instant, window: Duration) -> SchedulerResult<Step> {
    let mut queue = st.queue.clone();
    let advance = queue.advance(now, window)?;
    let mut record = st.donation.clone();
    match &advance {
        Advance::Next(next) => {
            record.agency_id = Some(next.clone());
        }
        Advance::Exhausted => {
            record.status = DonationStatus::Ready;
            record.agency_id = None;
        }
    }
    Ok(Step {
        queue,
        record,
        advance,
    })
}

impl<G> Inner<G>
where
    G: PersistenceGateway + 'static,
{
    /// Apply a step to the in-memory state, notify a new head, and release
    /// the slot when the queue ran out.
    async fn commit(&self, st: &mut OfferState, step: Step, epoch: u64) {
        st.queue = step.queue;
        st.donation = step.record;
        match step.advance {
            Advance::Next(next) => {
                info!(donation_id = %st.donation.id, agency_id = %next, "offer moved to next agency");
                self.notifier.offer(&next, &st.donation);
            }
            Advance::Exhausted => {
                st.closed = true;
                let donation_id = st.donation.id.clone();
                self.release(&donation_id, epoch).await;
                info!(%donation_id, "offer queue exhausted, donation back to ready");
            }
        }
    }

    /// Remove a slot if it still belongs to `epoch` and signal its task.
    async fn release(&self, donation_id: &str, epoch: u64) {
        let mut slots = self.slots.write().await;
        if slots.get(donation_id).is_some_and(|slot| slot.epoch == epoch) {
            if let Some(slot) = slots.remove(donation_id) {
                let _ = slot.shutdown_tx.send(true);
            }
        }
    }
}

/// The offer timer for a single donation.
async fn run_offer_loop<G>(
    inner: Arc<Inner<G>>,
    donation_id: DonationId,
    epoch: u64,
    state: Arc<Mutex<OfferState>>,
    mut shutdown: watch::Receiver<bool>,
) where
    G: PersistenceGateway + 'static,
{
    debug!(%donation_id, "offer loop starting");

    loop {
        let wait = {
            let st = state.lock().await;
            if st.closed {
                break;
            }
            st.queue
                .deadline()
                .saturating_duration_since(Instant::now())
                .min(inner.config.poll_interval())
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {
                debug!(%donation_id, "offer loop shutting down");
                break;
            }
        }

        let mut st = state.lock().await;
        if st.closed {
            break;
        }
        let now = Instant::now();
        if !st.queue.is_expired(now) {
            continue;
        }

        let expired = st.queue.head().cloned().unwrap_or_default();
        info!(%donation_id, agency_id = %expired, "offer window expired");

        let step = match next_step(&st, now, inner.config.offer_window()) {
            Ok(step) => step,
            Err(e) => {
                // The persisted record keeps its head; recovery re-ranks it.
                error!(%donation_id, error = %e, "cannot schedule next offer, stopping");
                st.closed = true;
                inner.release(&donation_id, epoch).await;
                break;
            }
        };
        if let Err(e) = inner.gateway.save_donation(&step.record) {
            error!(%donation_id, error = %e, "failed to persist offer advance");
        }
        inner.commit(&mut st, step, epoch).await;
        if st.closed {
            break;
        }
    }

    debug!(%donation_id, "offer loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    const WINDOW: Duration = Duration::from_secs(2);
    const POLL: Duration = Duration::from_millis(500);

    #[derive(Default)]
    struct RecordingNotifier {
        offers: StdMutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn offers(&self) -> Vec<(String, String)> {
            self.offers.lock().unwrap().clone()
        }
    }

    impl OfferNotifier for RecordingNotifier {
        fn offer(&self, agency_id: &str, donation: &Donation) {
            self.offers
                .lock()
                .unwrap()
                .push((agency_id.to_string(), donation.id.clone()));
        }
    }

    fn test_store() -> Arc<StateStore> {
        Arc::new(StateStore::open_in_memory().unwrap())
    }

    fn test_scheduler(store: Arc<StateStore>) -> Scheduler<StateStore> {
        Scheduler::new(
            store,
            RequirementCache::new(),
            SchedulerConfig::new(WINDOW, POLL).unwrap(),
        )
    }

    fn test_donation(id: &str) -> Donation {
        Donation {
            id: id.to_string(),
            donor_id: "donor-1".to_string(),
            food_type: FoodType::Halal,
            quantity: 5,
            location: GeoPoint::new(1.3, 104.0),
            status: DonationStatus::Ready,
            agency_id: None,
            created_at: 1000,
            expires_at: None,
        }
    }

    fn test_agency(id: &str, priority: bool, lat: f64, lon: f64) -> Agency {
        Agency {
            id: id.to_string(),
            name: id.to_string(),
            priority_flag: priority,
            location: GeoPoint::new(lat, lon),
        }
    }

    /// Ranked order for a donation at (1.3, 104): c, b, a.
    fn test_agencies() -> Vec<Agency> {
        vec![
            test_agency("a", false, 1.3, 103.8),
            test_agency("b", true, 1.45, 103.8),
            test_agency("c", true, 1.5, 104.0),
        ]
    }

    fn stored(store: &StateStore, id: &str) -> Donation {
        store.get_donation(id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn allocate_offers_head_and_persists() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());

        let result = scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();
        assert_eq!(
            result,
            Allocation::Offered {
                agency_id: "c".to_string(),
                queue_len: 3
            }
        );

        let donation = stored(&store, "don-1");
        assert_eq!(donation.status, DonationStatus::Allocated);
        assert_eq!(donation.agency_id.as_deref(), Some("c"));

        let offer = scheduler.offer("don-1").await.unwrap();
        assert_eq!(offer.head, "c");
        assert_eq!(offer.queue, vec!["c", "b", "a"]);
        assert!(scheduler.is_active("don-1").await);
    }

    #[tokio::test]
    async fn allocate_without_candidates_is_a_noop() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        store.put_donation(&test_donation("don-1")).unwrap();

        let result = scheduler.allocate(test_donation("don-1"), &[]).await.unwrap();
        assert_eq!(result, Allocation::NoCandidates);
        assert_eq!(stored(&store, "don-1").status, DonationStatus::Ready);
        assert!(!scheduler.is_active("don-1").await);
    }

    #[tokio::test]
    async fn allocate_requires_ready_status() {
        let scheduler = test_scheduler(test_store());
        let mut donation = test_donation("don-1");
        donation.status = DonationStatus::Accepted;

        let result = scheduler.allocate(donation, &test_agencies()).await;
        assert!(matches!(
            result,
            Err(SchedulerError::InvalidStateTransition {
                status: DonationStatus::Accepted,
                ..
            })
        ));
        assert!(!scheduler.is_active("don-1").await);
    }

    #[tokio::test]
    async fn allocate_twice_is_rejected() {
        let scheduler = test_scheduler(test_store());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        let again = scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await;
        assert!(matches!(
            again,
            Err(SchedulerError::InvalidStateTransition { .. })
        ));
        assert_eq!(scheduler.offer("don-1").await.unwrap().head, "c");
    }

    #[tokio::test]
    async fn allocate_rejects_invalid_location() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        let mut donation = test_donation("don-1");
        donation.location = GeoPoint::new(95.0, 104.0);

        let result = scheduler.allocate(donation, &test_agencies()).await;
        assert!(matches!(result, Err(SchedulerError::InvalidLocation(_))));
        assert!(store.get_donation("don-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn only_head_may_accept() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        assert!(!scheduler.accept("don-1", "a").await.unwrap());
        assert!(!scheduler.accept("don-1", "b").await.unwrap());
        let donation = stored(&store, "don-1");
        assert_eq!(donation.status, DonationStatus::Allocated);
        assert_eq!(donation.agency_id.as_deref(), Some("c"));
        assert_eq!(scheduler.offer("don-1").await.unwrap().queue.len(), 3);

        assert!(scheduler.accept("don-1", "c").await.unwrap());
        let donation = stored(&store, "don-1");
        assert_eq!(donation.status, DonationStatus::Accepted);
        assert_eq!(donation.agency_id.as_deref(), Some("c"));
        assert!(!scheduler.is_active("don-1").await);

        // A second accept finds no queue.
        assert!(!scheduler.accept("don-1", "c").await.unwrap());
    }

    #[tokio::test]
    async fn rejecting_every_head_walks_ranking_back_to_ready() {
        let store = test_store();
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Scheduler::with_parts(
            store.clone(),
            RequirementCache::new(),
            SchedulerConfig::new(WINDOW, POLL).unwrap(),
            notifier.clone(),
        );
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        let mut visited = Vec::new();
        while let Some(offer) = scheduler.offer("don-1").await {
            assert_eq!(stored(&store, "don-1").status, DonationStatus::Allocated);
            assert_eq!(stored(&store, "don-1").agency_id, Some(offer.head.clone()));
            assert!(scheduler.reject("don-1", &offer.head).await.unwrap());
            // Rejecting the same, now stale, agency again changes nothing.
            assert!(!scheduler.reject("don-1", &offer.head).await.unwrap());
            visited.push(offer.head);
        }

        assert_eq!(visited, vec!["c", "b", "a"]);
        let donation = stored(&store, "don-1");
        assert_eq!(donation.status, DonationStatus::Ready);
        assert_eq!(donation.agency_id, None);
        assert!(!scheduler.is_active("don-1").await);

        let offered: Vec<String> = notifier.offers().into_iter().map(|(a, _)| a).collect();
        assert_eq!(offered, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn ready_donation_can_be_requeued_after_exhaustion() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        let agencies = vec![test_agency("solo", false, 1.3, 103.9)];
        scheduler
            .allocate(test_donation("don-1"), &agencies)
            .await
            .unwrap();
        assert!(scheduler.reject("don-1", "solo").await.unwrap());

        let donation = stored(&store, "don-1");
        let again = scheduler.allocate(donation, &agencies).await.unwrap();
        assert!(matches!(again, Allocation::Offered { .. }));
    }

    #[tokio::test]
    async fn unknown_donation_is_not_found() {
        let scheduler = test_scheduler(test_store());
        assert!(matches!(
            scheduler.accept("ghost", "a").await,
            Err(SchedulerError::DonationNotFound(_))
        ));
        assert!(matches!(
            scheduler.reject("ghost", "a").await,
            Err(SchedulerError::DonationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn known_donation_without_queue_returns_false() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        store.put_donation(&test_donation("don-1")).unwrap();

        assert!(!scheduler.accept("don-1", "a").await.unwrap());
        assert!(!scheduler.reject("don-1", "a").await.unwrap());
        assert_eq!(stored(&store, "don-1").status, DonationStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_offer_moves_to_next_agency() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let offer = scheduler.offer("don-1").await.unwrap();
        assert_eq!(offer.head, "b");
        assert_eq!(offer.queue, vec!["b", "a"]);
        // Fresh window for the new head.
        assert!(offer.remaining > Duration::from_secs(1));
        assert!(offer.remaining <= WINDOW);
        assert_eq!(stored(&store, "don-1").agency_id.as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_from_every_agency_returns_donation_to_ready() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(!scheduler.is_active("don-1").await);
        let donation = stored(&store, "don-1");
        assert_eq!(donation.status, DonationStatus::Ready);
        assert_eq!(donation.agency_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_donation_is_not_advanced_by_timer() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.accept("don-1", "c").await.unwrap());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let donation = stored(&store, "don-1");
        assert_eq!(donation.status, DonationStatus::Accepted);
        assert_eq!(donation.agency_id.as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_accept_after_expiry_returns_false() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(!scheduler.accept("don-1", "c").await.unwrap());
        assert!(scheduler.accept("don-1", "b").await.unwrap());
        assert_eq!(stored(&store, "don-1").agency_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn donations_are_scheduled_independently() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();
        scheduler
            .allocate(test_donation("don-2"), &test_agencies())
            .await
            .unwrap();

        assert!(scheduler.reject("don-1", "c").await.unwrap());
        assert_eq!(scheduler.offer("don-1").await.unwrap().head, "b");
        assert_eq!(scheduler.offer("don-2").await.unwrap().head, "c");

        let mut active = scheduler.active_donations().await;
        active.sort();
        assert_eq!(active, vec!["don-1", "don-2"]);
    }

    #[tokio::test]
    async fn requirements_feed_ranking() {
        let scheduler = test_scheduler(test_store());
        // Same place, same priority: needs decide.
        let agencies = vec![
            test_agency("small", false, 1.4, 104.0),
            test_agency("large", false, 1.4, 104.0),
        ];
        scheduler
            .update_requirement(&Requirement {
                id: "r1".to_string(),
                agency_id: "large".to_string(),
                food_type: FoodType::Halal,
                quantity: 10,
            })
            .await;

        scheduler
            .allocate(test_donation("don-1"), &agencies)
            .await
            .unwrap();
        assert_eq!(scheduler.offer("don-1").await.unwrap().head, "large");

        assert!(scheduler.remove_requirement("large", FoodType::Halal).await);
        scheduler
            .allocate(test_donation("don-2"), &agencies)
            .await
            .unwrap();
        assert_eq!(scheduler.offer("don-2").await.unwrap().head, "small");
    }

    #[tokio::test]
    async fn shutdown_stops_all_offer_tasks() {
        let scheduler = test_scheduler(test_store());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();
        scheduler
            .allocate(test_donation("don-2"), &test_agencies())
            .await
            .unwrap();
        assert_eq!(scheduler.active_donations().await.len(), 2);

        scheduler.shutdown().await;
        assert!(scheduler.active_donations().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_drops_queue_and_keeps_record() {
        let store = test_store();
        let scheduler = test_scheduler(store.clone());
        scheduler
            .allocate(test_donation("don-1"), &test_agencies())
            .await
            .unwrap();

        assert!(scheduler.cancel("don-1").await);
        assert!(!scheduler.cancel("don-1").await);
        assert!(!scheduler.is_active("don-1").await);
        assert!(!scheduler.accept("don-1", "c").await.unwrap());
        assert_eq!(stored(&store, "don-1").status, DonationStatus::Allocated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_answers_from_head_apply_once() {
        for round in 0..20 {
            let store = test_store();
            let scheduler = Arc::new(test_scheduler(store.clone()));
            let id = format!("don-{round}");
            scheduler
                .allocate(test_donation(&id), &test_agencies())
                .await
                .unwrap();

            let mut calls = Vec::new();
            for i in 0..8 {
                let scheduler = scheduler.clone();
                let id = id.clone();
                calls.push(tokio::spawn(async move {
                    if i % 4 == 0 {
                        scheduler.reject(&id, "c").await.unwrap()
                    } else {
                        scheduler.accept(&id, "c").await.unwrap()
                    }
                }));
            }

            let mut applied = 0;
            for call in calls {
                if call.await.unwrap() {
                    applied += 1;
                }
            }
            assert_eq!(applied, 1, "round {round}");

            let record = stored(&store, &id);
            match scheduler.offer(&id).await {
                Some(offer) => {
                    assert_eq!(record.status, DonationStatus::Allocated);
                    assert_eq!(record.agency_id, Some(offer.head.clone()));
                    assert_eq!(offer.head, "b");
                }
                None => {
                    assert_eq!(record.status, DonationStatus::Accepted);
                    assert_eq!(record.agency_id.as_deref(), Some("c"));
                }
            }
            scheduler.shutdown().await;
        }
    }
}
