use std::sync::Arc;
use tracing::{info, warn};

use super::fallback_track_name;
use crate::error::LiveResult;
use crate::live::LiveCommands;
use crate::model::TrackInfo;

/// Scene count assumed when Live does not answer
pub const DEFAULT_SCENE_COUNT: i32 = 8;

/// Lists tracks so the user can pick clip slots to monitor
pub struct TrackListProvider {
    commands: Arc<LiveCommands>,
}

impl TrackListProvider {
    pub fn new(commands: Arc<LiveCommands>) -> Self {
        Self { commands }
    }

    pub async fn get_track_list(&self) -> LiveResult<Vec<TrackInfo>> {
        let num_tracks = self.commands.get_num_tracks().await?;

        let mut tracks = Vec::with_capacity(num_tracks.max(0) as usize);
        for index in 0..num_tracks {
            let track = match self.fetch_track(index).await {
                Ok(track) => track,
                Err(e) => {
                    warn!("Error fetching track {}: {}", index, e);
                    TrackInfo {
                        index,
                        name: fallback_track_name(index),
                        color: 0,
                    }
                }
            };
            tracks.push(track);
        }

        info!("✅ Fetched {} tracks", tracks.len());
        Ok(tracks)
    }

    async fn fetch_track(&self, index: i32) -> LiveResult<TrackInfo> {
        let name = self.commands.get_track_name(index).await?;
        let color = self.commands.get_track_color(index).await?;
        Ok(TrackInfo { index, name, color })
    }

    /// Number of clip slots per track
    pub async fn get_num_scenes(&self) -> i32 {
        match self.commands.get_num_scenes().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Error getting number of scenes: {}, assuming {}", e, DEFAULT_SCENE_COUNT);
                DEFAULT_SCENE_COUNT
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::live::addresses::*;
    use crate::osc::Transport;
    use crate::testing::FakeLive;
    use rosc::OscType;

    #[tokio::test]
    async fn test_track_list_with_partial_failure() {
        let fake = FakeLive::connected(|address, args| {
            let track = match args.first() {
                Some(OscType::Int(t)) => *t,
                _ => -1,
            };
            match address {
                SONG_NUM_TRACKS => Some(vec![OscType::Int(3)]),
                TRACK_NAME if track != 1 => {
                    Some(vec![OscType::Int(track), OscType::String(format!("Bus {}", track))])
                }
                TRACK_COLOR => Some(vec![OscType::Int(track), OscType::Int(42)]),
                _ => None,
            }
        });
        let timing = TimingConfig {
            request_timeout_ms: 50,
            ..TimingConfig::default()
        };
        let provider = TrackListProvider::new(Arc::new(LiveCommands::new(
            fake as Arc<dyn Transport>,
            &timing,
        )));

        let tracks = provider.get_track_list().await.unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].name, "Bus 0");
        assert_eq!(tracks[0].color, 42);
        assert_eq!(tracks[1].name, "Track 1");
        assert_eq!(tracks[1].color, 0);

        // No num_scenes reply
        assert_eq!(provider.get_num_scenes().await, DEFAULT_SCENE_COUNT);
    }
}
