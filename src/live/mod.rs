//! Command façade over the Live OSC transport
//!
//! Maps domain operations onto AbletonOSC addresses, decodes reply argument
//! positions into typed values, and keeps an explicit registry of the listeners
//! each subscription installed so unsubscribing removes exactly those.

pub mod addresses;
mod clip;
mod values;

pub use clip::{Acquisition, ClipAttribute, ClipScope, PollGroup};
pub use values::{osc_bool, ParamValue};

use parking_lot::Mutex;
use rosc::OscType;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TimingConfig;
use crate::error::LiveResult;
use crate::osc::{matches_prefix, ListenerId, OscReply, Transport};
use addresses::*;
use values::{arg_bool, arg_f64, arg_i32, arg_string, strings_after, values_after};

/// Receives parameter values pushed by Live
pub type ParameterCallback = Arc<dyn Fn(ParamValue) + Send + Sync>;

/// Receives the raw value of a pushed clip property
pub type ClipPropertyCallback = Arc<dyn Fn(&OscType) + Send + Sync>;

/// Identity of one active subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Parameter { track: i32, device: i32, parameter: i32 },
    Clip { track: i32, clip: i32, attribute: ClipAttribute },
}

/// Typed request/reply and subscription helpers shared by discovery and the state managers
pub struct LiveCommands {
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
    test_timeout: Duration,
    subscriptions: Mutex<HashMap<SubscriptionKey, Vec<(&'static str, ListenerId)>>>,
}

fn int(value: i32) -> OscType {
    OscType::Int(value)
}

impl LiveCommands {
    pub fn new(transport: Arc<dyn Transport>, timing: &TimingConfig) -> Self {
        Self {
            transport,
            request_timeout: timing.request_timeout(),
            test_timeout: timing.test_timeout(),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn request(&self, address: &str, args: Vec<OscType>) -> LiveResult<OscReply> {
        self.transport
            .request_reply(address, address, self.request_timeout, args)
            .await
    }

    // ===== Song / tracks =====

    /// Ping the remote script. Never fails: any error means "not reachable".
    pub async fn test_connection(&self) -> bool {
        match self
            .transport
            .request_reply(TEST, TEST, self.test_timeout, vec![])
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("Connection test failed: {}", e);
                false
            }
        }
    }

    pub async fn get_num_tracks(&self) -> LiveResult<i32> {
        let reply = self.request(SONG_NUM_TRACKS, vec![]).await?;
        arg_i32(&reply, 0)
    }

    pub async fn get_num_scenes(&self) -> LiveResult<i32> {
        let reply = self.request(SONG_NUM_SCENES, vec![]).await?;
        arg_i32(&reply, 0)
    }

    pub async fn get_track_name(&self, track: i32) -> LiveResult<String> {
        let reply = self.request(TRACK_NAME, vec![int(track)]).await?;
        arg_string(&reply, 1)
    }

    pub async fn get_track_color(&self, track: i32) -> LiveResult<i32> {
        let reply = self.request(TRACK_COLOR, vec![int(track)]).await?;
        arg_i32(&reply, 1)
    }

    /// Class names of every device on a track, in device order
    pub async fn get_device_class_names(&self, track: i32) -> LiveResult<Vec<String>> {
        let reply = self.request(TRACK_DEVICE_CLASS_NAMES, vec![int(track)]).await?;
        strings_after(&reply, 1)
    }

    // ===== Devices =====

    pub async fn get_device_name(&self, track: i32, device: i32) -> LiveResult<String> {
        let reply = self
            .request(DEVICE_NAME, vec![int(track), int(device)])
            .await?;
        arg_string(&reply, 2)
    }

    pub async fn get_parameter_names(&self, track: i32, device: i32) -> LiveResult<Vec<String>> {
        let reply = self
            .request(DEVICE_PARAMETER_NAMES, vec![int(track), int(device)])
            .await?;
        strings_after(&reply, 2)
    }

    /// Values in the same order as [`get_parameter_names`](Self::get_parameter_names)
    pub async fn get_parameter_values(&self, track: i32, device: i32) -> LiveResult<Vec<ParamValue>> {
        let reply = self
            .request(DEVICE_PARAMETER_VALUES, vec![int(track), int(device)])
            .await?;
        values_after(&reply, 2)
    }

    pub async fn get_parameter_value(&self, track: i32, device: i32, parameter: i32) -> LiveResult<ParamValue> {
        let reply = self
            .request(
                DEVICE_PARAMETER_VALUE,
                vec![int(track), int(device), int(parameter)],
            )
            .await?;
        let values = values_after(&reply, 3)?;
        values.into_iter().next().ok_or_else(|| {
            crate::error::LiveError::protocol(DEVICE_PARAMETER_VALUE, "reply carries no value")
        })
    }

    pub fn set_parameter_value(&self, track: i32, device: i32, parameter: i32, value: f32) -> LiveResult<()> {
        self.transport.send(
            DEVICE_SET_PARAMETER_VALUE,
            vec![int(track), int(device), int(parameter), OscType::Float(value)],
        )
    }

    /// Listen to one parameter; numeric and text replies both reach `on_change`
    ///
    /// Subscribing the same parameter twice replaces the earlier callback.
    pub fn subscribe_parameter(
        &self,
        track: i32,
        device: i32,
        parameter: i32,
        on_change: ParameterCallback,
    ) -> LiveResult<()> {
        let key = SubscriptionKey::Parameter { track, device, parameter };
        let triple = [int(track), int(device), int(parameter)];

        let mut installed = Vec::with_capacity(2);
        for address in [DEVICE_PARAMETER_VALUE, DEVICE_PARAMETER_VALUE_STRING] {
            let on_change = Arc::clone(&on_change);
            let triple = triple.clone();
            let id = self.transport.add_listener(
                address,
                Arc::new(move |reply: &OscReply| {
                    if !matches_prefix(&reply.args, &triple) {
                        return;
                    }
                    if let Some(value) = reply.args.get(3).and_then(ParamValue::from_osc) {
                        on_change(value);
                    }
                }),
            );
            installed.push((address, id));
        }

        self.install(key, installed, DEVICE_START_LISTEN_PARAMETER, triple.to_vec())
    }

    /// Stop listening and drop the callbacks installed by `subscribe_parameter`
    pub fn unsubscribe_parameter(&self, track: i32, device: i32, parameter: i32) -> LiveResult<()> {
        let key = SubscriptionKey::Parameter { track, device, parameter };
        self.uninstall(
            key,
            DEVICE_STOP_LISTEN_PARAMETER,
            vec![int(track), int(device), int(parameter)],
        )
    }

    // ===== Clip slots =====

    /// Fetch one clip property as the raw OSC value
    pub async fn get_clip_property(&self, track: i32, clip: i32, attribute: ClipAttribute) -> LiveResult<OscType> {
        let reply = self
            .request(attribute.get_address(), vec![int(track), int(clip)])
            .await?;
        reply.args.get(2).cloned().ok_or_else(|| {
            crate::error::LiveError::protocol(attribute.get_address(), "reply carries no value")
        })
    }

    pub async fn has_clip(&self, track: i32, clip: i32) -> LiveResult<bool> {
        let reply = self
            .request(CLIP_SLOT_HAS_CLIP, vec![int(track), int(clip)])
            .await?;
        arg_bool(&reply, 2)
    }

    pub async fn clip_is_playing(&self, track: i32, clip: i32) -> LiveResult<bool> {
        let reply = self
            .request(CLIP_IS_PLAYING, vec![int(track), int(clip)])
            .await?;
        arg_bool(&reply, 2)
    }

    pub async fn clip_is_recording(&self, track: i32, clip: i32) -> LiveResult<bool> {
        let reply = self
            .request(CLIP_IS_RECORDING, vec![int(track), int(clip)])
            .await?;
        arg_bool(&reply, 2)
    }

    /// Playing position in beats
    pub async fn clip_playing_position(&self, track: i32, clip: i32) -> LiveResult<f64> {
        let reply = self
            .request(CLIP_PLAYING_POSITION, vec![int(track), int(clip)])
            .await?;
        arg_f64(&reply, 2)
    }

    /// Clip length in beats
    pub async fn clip_length(&self, track: i32, clip: i32) -> LiveResult<f64> {
        let reply = self.request(CLIP_LENGTH, vec![int(track), int(clip)]).await?;
        arg_f64(&reply, 2)
    }

    pub fn subscribe_clip_property(
        &self,
        track: i32,
        clip: i32,
        attribute: ClipAttribute,
        on_change: ClipPropertyCallback,
    ) -> LiveResult<()> {
        let key = SubscriptionKey::Clip { track, clip, attribute };
        let pair = [int(track), int(clip)];

        let address = attribute.get_address();
        let filter = pair.clone();
        let id = self.transport.add_listener(
            address,
            Arc::new(move |reply: &OscReply| {
                if !matches_prefix(&reply.args, &filter) {
                    return;
                }
                if let Some(value) = reply.args.get(2) {
                    on_change(value);
                }
            }),
        );

        self.install(
            key,
            vec![(address, id)],
            attribute.start_listen_address(),
            pair.to_vec(),
        )
    }

    pub fn unsubscribe_clip_property(&self, track: i32, clip: i32, attribute: ClipAttribute) -> LiveResult<()> {
        let key = SubscriptionKey::Clip { track, clip, attribute };
        self.uninstall(
            key,
            attribute.stop_listen_address(),
            vec![int(track), int(clip)],
        )
    }

    // ===== Subscription registry =====

    /// Number of subscriptions currently holding listeners
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_subscribed(&self, key: &SubscriptionKey) -> bool {
        self.subscriptions.lock().contains_key(key)
    }

    fn remove_listeners(&self, listeners: Vec<(&'static str, ListenerId)>) {
        for (address, id) in listeners {
            self.transport.remove_listener(address, id);
        }
    }

    fn install(
        &self,
        key: SubscriptionKey,
        listeners: Vec<(&'static str, ListenerId)>,
        start_address: &str,
        args: Vec<OscType>,
    ) -> LiveResult<()> {
        let replaced = self.subscriptions.lock().insert(key, listeners);
        if let Some(previous) = replaced {
            debug!("Replacing existing subscription {:?}", key);
            self.remove_listeners(previous);
        }

        if let Err(e) = self.transport.send(start_address, args) {
            if let Some(listeners) = self.subscriptions.lock().remove(&key) {
                self.remove_listeners(listeners);
            }
            return Err(e);
        }
        Ok(())
    }

    fn uninstall(&self, key: SubscriptionKey, stop_address: &str, args: Vec<OscType>) -> LiveResult<()> {
        let removed = self.subscriptions.lock().remove(&key);
        match removed {
            Some(listeners) => self.remove_listeners(listeners),
            None => debug!("No active subscription for {:?}", key),
        }

        if !self.transport.is_connected() {
            debug!("Transport down, skipping {}", stop_address);
            return Ok(());
        }
        if let Err(e) = self.transport.send(stop_address, args) {
            warn!("Failed to send {}: {}", stop_address, e);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LiveError;
    use crate::testing::FakeLive;
    use parking_lot::Mutex as PlMutex;

    fn commands(fake: &Arc<FakeLive>) -> LiveCommands {
        LiveCommands::new(fake.clone() as Arc<dyn Transport>, &TimingConfig::default())
    }

    #[tokio::test]
    async fn test_track_queries_decode_reply_positions() {
        let fake = FakeLive::connected(|address, args| match address {
            SONG_NUM_TRACKS => Some(vec![OscType::Int(4)]),
            TRACK_NAME => Some(vec![args[0].clone(), OscType::String("Drums".into())]),
            TRACK_DEVICE_CLASS_NAMES => Some(vec![
                args[0].clone(),
                OscType::String("Eq8".into()),
                OscType::String("Looper".into()),
            ]),
            _ => None,
        });
        let live = commands(&fake);

        assert_eq!(live.get_num_tracks().await.unwrap(), 4);
        assert_eq!(live.get_track_name(2).await.unwrap(), "Drums");
        assert_eq!(
            live.get_device_class_names(1).await.unwrap(),
            vec!["Eq8".to_string(), "Looper".to_string()]
        );
    }

    #[tokio::test]
    async fn test_parameter_names_and_values_strip_indices() {
        let fake = FakeLive::connected(|address, args| match address {
            DEVICE_PARAMETER_NAMES => Some(vec![
                args[0].clone(),
                args[1].clone(),
                OscType::String("Device On".into()),
                OscType::String("State".into()),
            ]),
            DEVICE_PARAMETER_VALUES => Some(vec![
                args[0].clone(),
                args[1].clone(),
                OscType::Float(1.0),
                OscType::Float(2.0),
            ]),
            _ => None,
        });
        let live = commands(&fake);

        let names = live.get_parameter_names(0, 1).await.unwrap();
        let values = live.get_parameter_values(0, 1).await.unwrap();
        assert_eq!(names, vec!["Device On", "State"]);
        assert_eq!(values, vec![ParamValue::Number(1.0), ParamValue::Number(2.0)]);
    }

    #[tokio::test]
    async fn test_device_name_and_single_parameter() {
        let fake = FakeLive::connected(|address, args| match address {
            DEVICE_NAME => Some(vec![
                args[0].clone(),
                args[1].clone(),
                OscType::String("Looper".into()),
            ]),
            DEVICE_PARAMETER_VALUE => {
                let mut reply = args.to_vec();
                reply.push(OscType::Float(3.0));
                Some(reply)
            }
            _ => None,
        });
        let live = commands(&fake);

        assert_eq!(live.get_device_name(2, 0).await.unwrap(), "Looper");
        assert_eq!(
            live.get_parameter_value(2, 0, 1).await.unwrap(),
            ParamValue::Number(3.0)
        );
        assert_eq!(
            fake.sent_to(DEVICE_PARAMETER_VALUE),
            vec![vec![OscType::Int(2), OscType::Int(0), OscType::Int(1)]]
        );
    }

    #[tokio::test]
    async fn test_parameter_value_without_value_is_protocol_error() {
        let fake = FakeLive::connected(|address, args| match address {
            DEVICE_PARAMETER_VALUE => Some(args.to_vec()),
            _ => None,
        });
        let live = commands(&fake);
        assert!(matches!(
            live.get_parameter_value(0, 0, 1).await,
            Err(LiveError::Protocol { .. })
        ));
    }

    #[test]
    fn test_set_parameter_value_is_fire_and_forget() {
        let fake = FakeLive::connected(|_, _| None);
        let live = commands(&fake);

        live.set_parameter_value(1, 0, 4, 0.5).unwrap();
        assert_eq!(
            fake.sent_to(DEVICE_SET_PARAMETER_VALUE),
            vec![vec![
                OscType::Int(1),
                OscType::Int(0),
                OscType::Int(4),
                OscType::Float(0.5),
            ]]
        );

        fake.set_connected(false);
        assert!(matches!(
            live.set_parameter_value(1, 0, 4, 0.0),
            Err(LiveError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_connection_false_on_timeout() {
        let fake = FakeLive::connected(|_, _| None);
        let live = commands(&fake);
        assert!(!live.test_connection().await);
    }

    #[tokio::test]
    async fn test_malformed_count_is_protocol_error() {
        let fake = FakeLive::connected(|address, _| match address {
            SONG_NUM_TRACKS => Some(vec![OscType::String("many".into())]),
            _ => None,
        });
        let live = commands(&fake);
        assert!(matches!(
            live.get_num_tracks().await,
            Err(LiveError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscribe_parameter_filters_by_triple_on_both_addresses() {
        let fake = FakeLive::connected(|_, _| None);
        let live = commands(&fake);
        let seen: Arc<PlMutex<Vec<ParamValue>>> = Arc::new(PlMutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        live.subscribe_parameter(0, 1, 5, Arc::new(move |v: ParamValue| s.lock().push(v)))
            .unwrap();
        assert_eq!(
            fake.sent_to(DEVICE_START_LISTEN_PARAMETER),
            vec![vec![OscType::Int(0), OscType::Int(1), OscType::Int(5)]]
        );

        fake.inject(
            DEVICE_PARAMETER_VALUE,
            vec![OscType::Int(0), OscType::Int(1), OscType::Int(5), OscType::Float(2.0)],
        );
        fake.inject(
            DEVICE_PARAMETER_VALUE_STRING,
            vec![
                OscType::Int(0),
                OscType::Int(1),
                OscType::Int(5),
                OscType::String("Play".into()),
            ],
        );
        // Different parameter index is ignored
        fake.inject(
            DEVICE_PARAMETER_VALUE,
            vec![OscType::Int(0), OscType::Int(1), OscType::Int(6), OscType::Float(9.0)],
        );

        assert_eq!(
            *seen.lock(),
            vec![ParamValue::Number(2.0), ParamValue::Text("Play".into())]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_listeners() {
        let fake = FakeLive::connected(|_, _| None);
        let live = commands(&fake);

        for _ in 0..3 {
            live.subscribe_parameter(2, 0, 1, Arc::new(|_: ParamValue| {})).unwrap();
            live.unsubscribe_parameter(2, 0, 1).unwrap();
        }

        assert_eq!(live.active_subscriptions(), 0);
        assert_eq!(fake.listener_count(DEVICE_PARAMETER_VALUE), 0);
        assert_eq!(fake.listener_count(DEVICE_PARAMETER_VALUE_STRING), 0);
        assert_eq!(fake.sent_to(DEVICE_STOP_LISTEN_PARAMETER).len(), 3);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_listener() {
        let fake = FakeLive::connected(|_, _| None);
        let live = commands(&fake);

        live.subscribe_clip_property(1, 2, ClipAttribute::HasClip, Arc::new(|_: &OscType| {}))
            .unwrap();
        live.subscribe_clip_property(1, 2, ClipAttribute::HasClip, Arc::new(|_: &OscType| {}))
            .unwrap();

        assert_eq!(fake.listener_count(CLIP_SLOT_HAS_CLIP), 1);
        assert!(live.is_subscribed(&SubscriptionKey::Clip {
            track: 1,
            clip: 2,
            attribute: ClipAttribute::HasClip
        }));
    }

    #[tokio::test]
    async fn test_unsubscribe_while_disconnected_sends_nothing() {
        let fake = FakeLive::connected(|_, _| None);
        let live = commands(&fake);

        live.subscribe_clip_property(0, 0, ClipAttribute::HasClip, Arc::new(|_: &OscType| {}))
            .unwrap();
        fake.set_connected(false);
        live.unsubscribe_clip_property(0, 0, ClipAttribute::HasClip)
            .unwrap();

        assert!(fake.sent_to(CLIP_SLOT_STOP_LISTEN_HAS_CLIP).is_empty());
        assert_eq!(fake.listener_count(CLIP_SLOT_HAS_CLIP), 0);
    }

    #[tokio::test]
    async fn test_subscribe_while_disconnected_leaves_no_listener() {
        let fake = FakeLive::disconnected();
        let live = commands(&fake);

        let result = live.subscribe_parameter(0, 0, 0, Arc::new(|_: ParamValue| {}));
        assert!(matches!(result, Err(LiveError::NotConnected)));
        assert_eq!(live.active_subscriptions(), 0);
        assert_eq!(fake.listener_count(DEVICE_PARAMETER_VALUE), 0);
    }

    #[tokio::test]
    async fn test_clip_property_requests() {
        let fake = FakeLive::connected(|address, args| {
            let mut reply = args.to_vec();
            match address {
                CLIP_SLOT_HAS_CLIP => reply.push(OscType::Bool(true)),
                CLIP_IS_PLAYING => reply.push(OscType::Int(1)),
                CLIP_LENGTH => reply.push(OscType::Float(16.0)),
                _ => return None,
            }
            Some(reply)
        });
        let live = commands(&fake);

        assert!(live.has_clip(3, 0).await.unwrap());
        assert!(live.clip_is_playing(3, 0).await.unwrap());
        assert_eq!(live.clip_length(3, 0).await.unwrap(), 16.0);
        assert_eq!(
            live.get_clip_property(3, 0, ClipAttribute::Length).await.unwrap(),
            OscType::Float(16.0)
        );
    }
}
