use async_trait::async_trait;
use parking_lot::Mutex;
use rosc::OscType;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{Broadcaster, ClipStateMachine, ClipUpdate, StateMachine, StateManager};
use crate::config::TimingConfig;
use crate::error::{LiveError, LiveResult};
use crate::live::{Acquisition, ClipAttribute, LiveCommands, PollGroup};
use crate::model::{ClipInfo, ItemKind, ItemStateUpdate};
use crate::visual::VisualRegistry;

struct MonitoredClip {
    info: ClipInfo,
    machine: ClipStateMachine,
    /// Values collected since the last broadcast tick
    pending: ClipUpdate,
    last_update: Instant,
    /// Last polled `is_playing`, gates the position timer
    is_playing: bool,
    state_poll: Option<JoinHandle<()>>,
    position_poll: Option<JoinHandle<()>>,
}

impl MonitoredClip {
    /// Most recent `has_clip`, buffered or applied
    fn known_has_clip(&self) -> Option<bool> {
        self.pending
            .has_clip
            .or(self.machine.properties().has_clip)
    }

    fn cancel_timers(&mut self) {
        if let Some(handle) = self.state_poll.take() {
            handle.abort();
        }
        if let Some(handle) = self.position_poll.take() {
            handle.abort();
        }
    }
}

struct Inner {
    commands: Arc<LiveCommands>,
    visuals: Arc<VisualRegistry>,
    clips: Mutex<HashMap<String, MonitoredClip>>,
    broadcaster: Broadcaster,
    state_poll_period: Duration,
    position_poll_period: Duration,
}

/// Monitors clip slots: `has_clip` by push, everything else by polling
///
/// Pushed and polled values are buffered per clip and folded into the state
/// machine once per broadcast tick, under the same lock that reads the
/// snapshot.
pub struct ClipStateManager {
    inner: Arc<Inner>,
}

impl ClipStateManager {
    pub fn new(commands: Arc<LiveCommands>, visuals: Arc<VisualRegistry>, timing: &TimingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                commands,
                visuals,
                clips: Mutex::new(HashMap::new()),
                broadcaster: Broadcaster::new(timing.broadcast_interval()),
                state_poll_period: timing.clip_state_poll(),
                position_poll_period: timing.clip_position_poll(),
            }),
        }
    }

    /// Current snapshot of one clip (pending values not yet applied)
    pub fn snapshot(&self, id: &str) -> Option<ItemStateUpdate> {
        self.inner.clips.lock().get(id).map(snapshot_of)
    }

    /// Time since the clip's state machine last reported a change
    pub fn since_last_update(&self, id: &str) -> Option<Duration> {
        self.inner
            .clips
            .lock()
            .get(id)
            .map(|clip| clip.last_update.elapsed())
    }

    pub fn is_polling_position(&self, id: &str) -> bool {
        self.inner
            .clips
            .lock()
            .get(id)
            .is_some_and(|clip| clip.position_poll.is_some())
    }

    pub fn is_broadcasting(&self) -> bool {
        self.inner.broadcaster.is_running()
    }

    fn unsubscribe_pushed(&self, clip: &ClipInfo) {
        for attribute in ClipAttribute::pushed() {
            if let Err(e) = self.inner.commands.unsubscribe_clip_property(
                clip.track_index,
                clip.clip_index,
                attribute,
            ) {
                debug!("Unsubscribe of {} on {} failed: {}", attribute, clip.id, e);
            }
        }
    }
}

fn snapshot_of(clip: &MonitoredClip) -> ItemStateUpdate {
    ItemStateUpdate {
        item_id: clip.info.id.clone(),
        kind: ItemKind::Clip,
        state: clip.machine.state(),
        position: clip.machine.position(),
        length: clip.machine.length(),
        has_position: true,
    }
}

impl Inner {
    fn buffer(&self, id: &str, attribute: ClipAttribute, value: &OscType) {
        let mut clips = self.clips.lock();
        let Some(clip) = clips.get_mut(id) else {
            return;
        };
        trace!("📦 {} {} = {:?}", id, attribute, value);
        if !clip.pending.set(attribute, value) {
            warn!("Ignoring {} for {}: unexpected value {:?}", attribute, id, value);
            return;
        }

        // Slot emptied: nothing left to play
        if attribute == ClipAttribute::HasClip && clip.pending.has_clip == Some(false) {
            clip.is_playing = false;
            if let Some(handle) = clip.position_poll.take() {
                handle.abort();
                debug!("⏹️ Position polling stopped for {}, slot emptied", id);
            }
        }
    }

    /// Fold a batch straight into the state machine (initial query)
    fn apply_now(&self, id: &str, update: &ClipUpdate) -> bool {
        let mut clips = self.clips.lock();
        let Some(clip) = clips.get_mut(id) else {
            return false;
        };
        if clip.machine.update(update) {
            clip.last_update = Instant::now();
        }
        true
    }

    /// Apply pending batches and publish; false once nothing is monitored
    fn broadcast(&self) -> bool {
        let updates: Vec<ItemStateUpdate> = {
            let mut clips = self.clips.lock();
            if clips.is_empty() {
                return false;
            }
            clips
                .values_mut()
                .map(|clip| {
                    let pending = std::mem::take(&mut clip.pending);
                    if !pending.is_empty() && clip.machine.update(&pending) {
                        clip.last_update = Instant::now();
                    }
                    snapshot_of(clip)
                })
                .collect()
        };

        for update in &updates {
            self.visuals.publish(update);
        }
        true
    }

    fn start_position_polling(self: &Arc<Self>, id: &str) {
        let mut clips = self.clips.lock();
        let Some(clip) = clips.get_mut(id) else {
            return;
        };
        if clip.position_poll.is_some() {
            return;
        }
        debug!("▶️ Position polling started for {}", id);
        clip.position_poll = Some(tokio::spawn(position_poll_loop(
            Arc::downgrade(self),
            id.to_string(),
            self.position_poll_period,
        )));
    }

    fn stop_position_polling(&self, id: &str) {
        let mut clips = self.clips.lock();
        if let Some(handle) = clips.get_mut(id).and_then(|clip| clip.position_poll.take()) {
            handle.abort();
            debug!("⏹️ Position polling stopped for {}", id);
        }
    }

    async fn query_initial_state(self: &Arc<Self>, clip: &ClipInfo) {
        let (track, slot) = (clip.track_index, clip.clip_index);

        let has_clip = match self.commands.has_clip(track, slot).await {
            Ok(has_clip) => has_clip,
            Err(e) => {
                warn!("❌ Failed to query initial state for clip {}: {}", clip.id, e);
                return;
            }
        };
        debug!("📋 {} initial has_clip={}", clip.id, has_clip);
        if !self.apply_now(&clip.id, &ClipUpdate { has_clip: Some(has_clip), ..ClipUpdate::default() }) {
            return;
        }
        if !has_clip {
            return;
        }

        let mut initial = ClipUpdate::default();
        let mut playing = false;
        match self.commands.clip_is_playing(track, slot).await {
            Ok(value) => {
                initial.is_playing = Some(value);
                playing = value;
            }
            Err(e) => debug!("{} initial is_playing unavailable: {}", clip.id, e),
        }
        match self.commands.clip_is_recording(track, slot).await {
            Ok(value) => initial.is_recording = Some(value),
            Err(e) => debug!("{} initial is_recording unavailable: {}", clip.id, e),
        }
        match self.commands.clip_length(track, slot).await {
            Ok(value) => initial.length = Some(value),
            Err(e) => debug!("{} initial length unavailable: {}", clip.id, e),
        }
        if playing {
            match self.commands.clip_playing_position(track, slot).await {
                Ok(value) => initial.position = Some(value),
                Err(e) => debug!("{} initial position unavailable: {}", clip.id, e),
            }
        }
        debug!("📋 {} initial state {:?}", clip.id, initial);

        if !self.apply_now(&clip.id, &initial) {
            return;
        }

        if playing {
            if let Some(record) = self.clips.lock().get_mut(&clip.id) {
                record.is_playing = true;
            }
            self.start_position_polling(&clip.id);
        }
    }
}

async fn state_poll_loop(inner: Weak<Inner>, id: String, period: Duration, mut was_playing: bool) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut was_recording = false;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let (track, slot, has_clip) = {
            let clips = inner.clips.lock();
            let Some(clip) = clips.get(&id) else {
                break;
            };
            (clip.info.track_index, clip.info.clip_index, clip.known_has_clip())
        };
        if has_clip == Some(false) {
            // A clip appearing later starts from a clean transition
            was_playing = false;
            was_recording = false;
            continue;
        }

        let polled = fetch_group(&inner.commands, track, slot, Acquisition::Poll(PollGroup::State)).await;
        let mut batch = match polled {
            Ok(batch) => batch,
            Err(e) => {
                trace!("State poll for {} skipped: {}", id, e);
                continue;
            }
        };
        let (Some(is_playing), Some(is_recording)) = (batch.is_playing, batch.is_recording) else {
            continue;
        };

        let started_playing = is_playing && !was_playing;
        let stopped_playing = !is_playing && was_playing;
        let stopped_recording = !is_recording && was_recording;

        if started_playing || stopped_recording {
            match fetch_group(&inner.commands, track, slot, Acquisition::OnTransition).await {
                Ok(refreshed) => batch.merge(&refreshed),
                Err(e) => trace!("Transition refresh for {} failed: {}", id, e),
            }
        }

        {
            let mut clips = inner.clips.lock();
            let Some(clip) = clips.get_mut(&id) else {
                break;
            };
            clip.pending.merge(&batch);
            clip.is_playing = is_playing;
        }

        if started_playing {
            inner.start_position_polling(&id);
        } else if stopped_playing {
            inner.stop_position_polling(&id);
        }

        was_playing = is_playing;
        was_recording = is_recording;
    }
}

async fn position_poll_loop(inner: Weak<Inner>, id: String, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let (track, slot) = {
            let clips = inner.clips.lock();
            let Some(clip) = clips.get(&id) else {
                break;
            };
            if !clip.is_playing {
                continue;
            }
            (clip.info.track_index, clip.info.clip_index)
        };

        let polled = fetch_group(&inner.commands, track, slot, Acquisition::Poll(PollGroup::Position)).await;
        if let Ok(batch) = polled {
            if let Some(clip) = inner.clips.lock().get_mut(&id) {
                clip.pending.merge(&batch);
            }
        }
    }
}

/// Fetch every attribute acquired in `mode` concurrently; one failure fails the batch
async fn fetch_group(
    commands: &Arc<LiveCommands>,
    track: i32,
    slot: i32,
    mode: Acquisition,
) -> LiveResult<ClipUpdate> {
    let mut requests = JoinSet::new();
    for attribute in ClipAttribute::acquired_by(mode) {
        let commands = Arc::clone(commands);
        requests.spawn(async move {
            let value = commands.get_clip_property(track, slot, attribute).await?;
            Ok::<_, LiveError>((attribute, value))
        });
    }

    let mut batch = ClipUpdate::default();
    while let Some(joined) = requests.join_next().await {
        let Ok(result) = joined else {
            continue;
        };
        let (attribute, value) = result?;
        if !batch.set(attribute, &value) {
            return Err(LiveError::protocol(attribute.get_address(), "unexpected value type"));
        }
    }
    Ok(batch)
}

fn broadcast_tick(inner: Weak<Inner>) -> impl Fn() -> bool + Send + 'static {
    move || inner.upgrade().is_some_and(|inner| inner.broadcast())
}

#[async_trait]
impl StateManager for ClipStateManager {
    type Item = ClipInfo;

    async fn start_monitoring(&self, clip: &ClipInfo) -> LiveResult<bool> {
        info!(
            "🎬 Starting monitoring for clip \"{}\" ({}: track {}, slot {})",
            clip.display_name(),
            clip.id,
            clip.track_index,
            clip.clip_index
        );

        match self.inner.clips.lock().entry(clip.id.clone()) {
            Entry::Occupied(_) => {
                warn!("⚠️ Already monitoring clip {}", clip.id);
                return Ok(false);
            }
            Entry::Vacant(slot) => {
                slot.insert(MonitoredClip {
                    info: clip.clone(),
                    machine: ClipStateMachine::new(),
                    pending: ClipUpdate::default(),
                    last_update: Instant::now(),
                    is_playing: false,
                    state_poll: None,
                    position_poll: None,
                });
            }
        }

        for attribute in ClipAttribute::pushed() {
            let weak = Arc::downgrade(&self.inner);
            let id = clip.id.clone();
            let subscribed = self.inner.commands.subscribe_clip_property(
                clip.track_index,
                clip.clip_index,
                attribute,
                Arc::new(move |value: &OscType| {
                    if let Some(inner) = weak.upgrade() {
                        inner.buffer(&id, attribute, value);
                    }
                }),
            );

            if let Err(e) = subscribed {
                warn!("❌ Failed to subscribe {} {}: {}", clip.id, attribute, e);
                self.inner.clips.lock().remove(&clip.id);
                self.unsubscribe_pushed(clip);
                return Err(e);
            }
        }

        self.inner.query_initial_state(clip).await;

        {
            let mut clips = self.inner.clips.lock();
            // Stopped while the initial query was in flight
            let Some(record) = clips.get_mut(&clip.id) else {
                debug!("Clip {} was stopped during start-up", clip.id);
                return Ok(false);
            };
            if let Some(stale) = record.state_poll.take() {
                stale.abort();
            }
            record.state_poll = Some(tokio::spawn(state_poll_loop(
                Arc::downgrade(&self.inner),
                clip.id.clone(),
                self.inner.state_poll_period,
                record.is_playing,
            )));
        }

        self.inner
            .broadcaster
            .ensure_running(broadcast_tick(Arc::downgrade(&self.inner)));

        info!("✅ Monitoring clip {}", clip.display_name());
        Ok(true)
    }

    fn stop_monitoring(&self, id: &str) -> bool {
        let (removed, now_empty) = {
            let mut clips = self.inner.clips.lock();
            let removed = clips.remove(id);
            (removed, clips.is_empty())
        };
        let Some(mut clip) = removed else {
            return false;
        };

        clip.cancel_timers();
        self.unsubscribe_pushed(&clip.info);

        if now_empty {
            self.inner.broadcaster.stop();
        }
        info!("Stopped monitoring clip: {}", id);
        true
    }

    fn monitored_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.clips.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn is_monitoring(&self, id: &str) -> bool {
        self.inner.clips.lock().contains_key(id)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for clip in self.clips.get_mut().values_mut() {
            clip.cancel_timers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::addresses::*;
    use crate::model::MonitoredState;
    use crate::osc::Transport;
    use crate::testing::FakeLive;
    use crate::visual::ChannelConsumer;
    use parking_lot::RwLock;

    /// Scripted clip slot state
    #[derive(Clone, Copy)]
    struct Slot {
        has_clip: bool,
        playing: bool,
        recording: bool,
        position: f32,
        length: f32,
    }

    fn scripted(slot: Arc<RwLock<Slot>>) -> Arc<FakeLive> {
        FakeLive::connected(move |address, args| {
            let s = *slot.read();
            let value = match address {
                CLIP_SLOT_HAS_CLIP => OscType::Bool(s.has_clip),
                CLIP_IS_PLAYING => OscType::Bool(s.playing),
                CLIP_IS_RECORDING => OscType::Bool(s.recording),
                CLIP_PLAYING_POSITION => OscType::Float(s.position),
                CLIP_LENGTH => OscType::Float(s.length),
                _ => return None,
            };
            let mut reply = args.to_vec();
            reply.push(value);
            Some(reply)
        })
    }

    fn manager(fake: &Arc<FakeLive>) -> (ClipStateManager, Arc<VisualRegistry>) {
        let timing = TimingConfig {
            request_timeout_ms: 50,
            ..TimingConfig::default()
        };
        let commands = Arc::new(LiveCommands::new(fake.clone() as Arc<dyn Transport>, &timing));
        let visuals = Arc::new(VisualRegistry::new());
        (ClipStateManager::new(commands, Arc::clone(&visuals), &timing), visuals)
    }

    const STOPPED_SLOT: Slot = Slot {
        has_clip: true,
        playing: false,
        recording: false,
        position: 0.0,
        length: 8.0,
    };

    #[tokio::test(start_paused = true)]
    async fn test_initial_query_folds_into_machine() {
        let slot = Arc::new(RwLock::new(Slot { playing: true, position: 2.0, ..STOPPED_SLOT }));
        let fake = scripted(Arc::clone(&slot));
        let (manager, _) = manager(&fake);
        let clip = ClipInfo::new(0, 2, "Drums", 0);

        assert!(manager.start_monitoring(&clip).await.unwrap());

        let snapshot = manager.snapshot(&clip.id).unwrap();
        assert_eq!(snapshot.state, MonitoredState::Playing);
        assert_eq!(snapshot.length, 8.0);
        assert_eq!(snapshot.position, 0.25);
        assert!(snapshot.has_position);
        assert!(manager.is_polling_position(&clip.id));
        assert_eq!(fake.sent_to(CLIP_SLOT_START_LISTEN_HAS_CLIP).len(), 1);

        manager.stop_monitoring(&clip.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_then_playing_then_recording() {
        let slot = Arc::new(RwLock::new(Slot { has_clip: false, ..STOPPED_SLOT }));
        let fake = scripted(Arc::clone(&slot));
        let (manager, visuals) = manager(&fake);
        let clip = ClipInfo::new(1, 0, "Vox", 0);

        let (consumer, mut rx) = ChannelConsumer::new();
        visuals.register(&clip.id, consumer);
        manager.start_monitoring(&clip).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.state, MonitoredState::Empty);
        assert_eq!(first.kind, ItemKind::Clip);

        // Clip recorded into the slot: has_clip is pushed, the flags are polled
        *slot.write() = Slot { playing: true, ..STOPPED_SLOT };
        fake.inject(
            CLIP_SLOT_HAS_CLIP,
            vec![OscType::Int(1), OscType::Int(0), OscType::Bool(true)],
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(manager.snapshot(&clip.id).unwrap().state, MonitoredState::Playing);
        assert!(manager.is_polling_position(&clip.id));

        slot.write().recording = true;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(manager.snapshot(&clip.id).unwrap().state, MonitoredState::Recording);

        slot.write().recording = false;
        slot.write().playing = false;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(manager.snapshot(&clip.id).unwrap().state, MonitoredState::Stopped);
        assert!(!manager.is_polling_position(&clip.id));

        manager.stop_all_monitoring();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleting_playing_clip_stops_position_polling() {
        let slot = Arc::new(RwLock::new(Slot { playing: true, ..STOPPED_SLOT }));
        let fake = scripted(Arc::clone(&slot));
        let (manager, _) = manager(&fake);
        let clip = ClipInfo::new(1, 0, "Vox", 0);

        manager.start_monitoring(&clip).await.unwrap();
        tokio::time::sleep(Duration::from_millis(230)).await;
        assert!(manager.is_polling_position(&clip.id));

        // Clip deleted from the slot while playing
        *slot.write() = Slot { has_clip: false, playing: false, ..STOPPED_SLOT };
        fake.inject(
            CLIP_SLOT_HAS_CLIP,
            vec![OscType::Int(1), OscType::Int(0), OscType::Bool(false)],
        );
        assert!(!manager.is_polling_position(&clip.id));

        let positions = fake.sent_to(CLIP_PLAYING_POSITION).len();
        let polls = fake.sent_to(CLIP_IS_PLAYING).len();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fake.sent_to(CLIP_PLAYING_POSITION).len(), positions);
        assert_eq!(fake.sent_to(CLIP_IS_PLAYING).len(), polls);
        assert_eq!(manager.snapshot(&clip.id).unwrap().state, MonitoredState::Empty);

        // A new clip playing in the slot restarts position polling
        *slot.write() = Slot { playing: true, ..STOPPED_SLOT };
        fake.inject(
            CLIP_SLOT_HAS_CLIP,
            vec![OscType::Int(1), OscType::Int(0), OscType::Bool(true)],
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(manager.is_polling_position(&clip.id));
        assert_eq!(manager.snapshot(&clip.id).unwrap().state, MonitoredState::Playing);

        manager.stop_monitoring(&clip.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_start_stops_position_polling_when_clip_stops() {
        let slot = Arc::new(RwLock::new(Slot { playing: true, ..STOPPED_SLOT }));
        let fake = scripted(Arc::clone(&slot));
        let (manager, _) = manager(&fake);
        let clip = ClipInfo::new(2, 1, "Pad", 0);

        manager.start_monitoring(&clip).await.unwrap();
        assert!(manager.is_polling_position(&clip.id));

        // First state poll already sees the clip stopped
        slot.write().playing = false;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!manager.is_polling_position(&clip.id));
        assert_eq!(manager.snapshot(&clip.id).unwrap().state, MonitoredState::Stopped);

        manager.stop_monitoring(&clip.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_state_polls_while_slot_empty() {
        let slot = Arc::new(RwLock::new(Slot { has_clip: false, ..STOPPED_SLOT }));
        let fake = scripted(Arc::clone(&slot));
        let (manager, _) = manager(&fake);
        let clip = ClipInfo::new(0, 0, "Empty", 0);

        manager.start_monitoring(&clip).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(fake.sent_to(CLIP_IS_PLAYING).is_empty());
        assert!(fake.sent_to(CLIP_IS_RECORDING).is_empty());
        manager.stop_monitoring(&clip.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timers_synchronously() {
        let slot = Arc::new(RwLock::new(Slot { playing: true, ..STOPPED_SLOT }));
        let fake = scripted(Arc::clone(&slot));
        let (manager, _) = manager(&fake);
        let clip = ClipInfo::new(3, 1, "Keys", 0);

        manager.start_monitoring(&clip).await.unwrap();
        // Off every timer boundary, so no poll is mid-flight
        tokio::time::sleep(Duration::from_millis(230)).await;
        assert!(manager.is_broadcasting());
        assert!(manager.is_polling_position(&clip.id));

        assert!(manager.stop_monitoring(&clip.id));
        let polls = fake.sent_to(CLIP_IS_PLAYING).len();
        let positions = fake.sent_to(CLIP_PLAYING_POSITION).len();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fake.sent_to(CLIP_IS_PLAYING).len(), polls);
        assert_eq!(fake.sent_to(CLIP_PLAYING_POSITION).len(), positions);
        assert!(!manager.is_broadcasting());
        assert_eq!(fake.listener_count(CLIP_SLOT_HAS_CLIP), 0);
        assert_eq!(fake.sent_to(CLIP_SLOT_STOP_LISTEN_HAS_CLIP).len(), 1);

        // Unknown id and second stop are no-ops
        assert!(!manager.stop_monitoring(&clip.id));
        assert!(!manager.stop_monitoring("clip-9-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_start_keeps_single_subscription() {
        let slot = Arc::new(RwLock::new(STOPPED_SLOT));
        let fake = scripted(Arc::clone(&slot));
        let (manager, _) = manager(&fake);
        let clip = ClipInfo::new(0, 0, "Bass", 0);

        assert!(manager.start_monitoring(&clip).await.unwrap());
        assert!(!manager.start_monitoring(&clip).await.unwrap());

        assert_eq!(fake.sent_to(CLIP_SLOT_START_LISTEN_HAS_CLIP).len(), 1);
        assert_eq!(fake.listener_count(CLIP_SLOT_HAS_CLIP), 1);
        assert_eq!(manager.monitored_ids(), vec![clip.id.clone()]);
        manager.stop_all_monitoring();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_initial_query_keeps_one_poller() {
        // Silent until the restart, so the first start waits on has_clip
        let fake = FakeLive::connected(|_, _| None);
        let (manager, _) = manager(&fake);
        let manager = Arc::new(manager);
        let clip = ClipInfo::new(0, 0, "Bass", 0);

        let first = {
            let manager = Arc::clone(&manager);
            let clip = clip.clone();
            tokio::spawn(async move { manager.start_monitoring(&clip).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(manager.stop_monitoring(&clip.id));

        let slot = STOPPED_SLOT;
        fake.set_responder(move |address, args| {
            let value = match address {
                CLIP_SLOT_HAS_CLIP => OscType::Bool(slot.has_clip),
                CLIP_IS_PLAYING => OscType::Bool(slot.playing),
                CLIP_IS_RECORDING => OscType::Bool(slot.recording),
                CLIP_LENGTH => OscType::Float(slot.length),
                _ => return None,
            };
            let mut reply = args.to_vec();
            reply.push(value);
            Some(reply)
        });
        assert!(manager.start_monitoring(&clip).await.unwrap());
        first.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let before = fake.sent_to(CLIP_IS_PLAYING).len();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let polls = fake.sent_to(CLIP_IS_PLAYING).len() - before;
        assert!(polls <= 11, "{} state polls in one second", polls);

        manager.stop_all_monitoring();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_monitor_once() {
        let fake = scripted(Arc::new(RwLock::new(STOPPED_SLOT)));
        let (manager, _) = manager(&fake);
        let manager = Arc::new(manager);
        let clip = ClipInfo::new(0, 1, "Bass", 0);

        let mut starts = JoinSet::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let clip = clip.clone();
            starts.spawn(async move { manager.start_monitoring(&clip).await.unwrap() });
        }
        let mut started = 0;
        while let Some(joined) = starts.join_next().await {
            if joined.unwrap() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(fake.sent_to(CLIP_SLOT_START_LISTEN_HAS_CLIP).len(), 1);
        assert_eq!(fake.listener_count(CLIP_SLOT_HAS_CLIP), 1);
        manager.stop_all_monitoring();
    }

    #[tokio::test]
    async fn test_start_while_disconnected_fails_cleanly() {
        let fake = FakeLive::disconnected();
        let (manager, _) = manager(&fake);
        let clip = ClipInfo::new(0, 0, "Bass", 0);

        assert!(manager.start_monitoring(&clip).await.is_err());
        assert!(!manager.is_monitoring(&clip.id));
        assert!(!manager.is_broadcasting());
    }
}
