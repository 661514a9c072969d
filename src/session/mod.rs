//! Sort session - the per-track tapping loop.
//!
//! For each track in playlist order:
//! 1. Look the track up in the tempo cache
//! 2. Known and policy is Skip: reuse the cached tempo, no interaction
//! 3. Otherwise play the track from the head-start offset, let the user tap,
//!    pause again
//! 4. Merge the tapped tempo into the cache according to the policy
//!
//! The first failing track aborts the loop. [`Session::run`] reorders the
//! playlist only when every track went through and writes the cache on every
//! exit path; a failed write is part of the returned error. Dropping the
//! future still writes the cache, but can only log a failure.

use std::time::Duration;

use crate::cache::{MergePolicy, PersistGuard, TempoCache};
use crate::error::{Error, Result, ResultExt};
use crate::model::{PlaylistSelection, Track};
use crate::reorder::{self, CommitError, CommitReport, PendingTracks};
use crate::spotify::PlaylistProvider;
use crate::tempo::{DEFAULT_TAP_COUNT, TempoEstimator};

/// Settings chosen at the start of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Taps per track
    pub tap_count: u32,
    /// Playback starts this far into each track
    pub head_start: Duration,
    pub policy: MergePolicy,
    /// Play each track on this device while tapping; `None` = user plays it
    pub device_id: Option<String>,
    /// Pause before each tapped track
    pub rest: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tap_count: DEFAULT_TAP_COUNT,
            head_start: Duration::from_secs(30),
            policy: MergePolicy::Replace,
            device_id: None,
            rest: Duration::from_millis(500),
        }
    }
}

/// Progress notifications for whoever drives the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Cached tempo reused without tapping
    Recalled { name: String, bpm: f64 },
    /// About to collect taps for a track (1-based position)
    Analysing {
        name: String,
        position: usize,
        total: usize,
        tap_count: u32,
    },
    /// Taps collected and merged into the cache
    Tapped {
        name: String,
        tapped: u32,
        prior: Option<f64>,
        stored: f64,
        policy: MergePolicy,
    },
    /// All tracks done; writing the new order
    Committing { tracks: usize },
}

/// What happened to one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackOutcome {
    Recalled { bpm: f64 },
    Tapped { tapped: u32, stored: f64 },
}

impl TrackOutcome {
    pub fn bpm(&self) -> f64 {
        match self {
            Self::Recalled { bpm } => *bpm,
            Self::Tapped { stored, .. } => *stored,
        }
    }
}

/// Result of a completed session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Tracks in their new order
    pub tracks: Vec<Track>,
    pub outcomes: Vec<TrackOutcome>,
    pub commit: CommitReport,
}

impl SessionReport {
    pub fn tapped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TrackOutcome::Tapped { .. }))
            .count()
    }
}

/// Everything a run needs, owned for its duration.
pub struct Session<'a, P: ?Sized, E> {
    provider: &'a P,
    estimator: E,
    cache: PersistGuard,
    options: SessionOptions,
}

impl<'a, P, E> Session<'a, P, E>
where
    P: PlaylistProvider + ?Sized,
    E: TempoEstimator,
{
    pub fn new(provider: &'a P, estimator: E, cache: TempoCache, options: SessionOptions) -> Self {
        Self {
            provider,
            estimator,
            cache: PersistGuard::new(cache),
            options,
        }
    }

    pub fn cache(&self) -> &TempoCache {
        &self.cache
    }

    /// Assign a tempo to every track, stopping at the first failure.
    ///
    /// Tempos assigned before a failure stay on their tracks and in the cache.
    pub async fn analyse(
        &mut self,
        tracks: &mut [Track],
        observer: &mut impl FnMut(SessionEvent),
    ) -> Result<Vec<TrackOutcome>> {
        let total = tracks.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, track) in tracks.iter_mut().enumerate() {
            let outcome = self.process_track(track, index + 1, total, observer).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Decide, tap and merge for one track.
    pub async fn process_track(
        &mut self,
        track: &mut Track,
        position: usize,
        total: usize,
        observer: &mut impl FnMut(SessionEvent),
    ) -> Result<TrackOutcome> {
        let prior = self.cache.lookup(&track.id);

        if let (Some(bpm), MergePolicy::Skip) = (prior, self.options.policy) {
            tracing::debug!("Skipping {} with cached tempo {}", track.id, bpm);
            track.bpm = Some(bpm);
            observer(SessionEvent::Recalled {
                name: track.display_name(),
                bpm,
            });
            return Ok(TrackOutcome::Recalled { bpm });
        }

        if !self.options.rest.is_zero() {
            tokio::time::sleep(self.options.rest).await;
        }

        observer(SessionEvent::Analysing {
            name: track.display_name(),
            position,
            total,
            tap_count: self.options.tap_count,
        });

        let tapped = self.tap_with_playback(track).await?;
        let stored = self.cache.merge(track, f64::from(tapped), self.options.policy);
        track.bpm = Some(stored);

        observer(SessionEvent::Tapped {
            name: track.display_name(),
            tapped,
            prior,
            stored,
            policy: self.options.policy,
        });
        Ok(TrackOutcome::Tapped { tapped, stored })
    }

    async fn tap_with_playback(&mut self, track: &Track) -> Result<u32> {
        let device = self.options.device_id.clone();

        if let Some(device_id) = device.as_deref() {
            self.provider.start_playback(device_id, &track.uri).await?;
            self.provider.seek(device_id, self.options.head_start).await?;
        }

        let estimated = self
            .estimator
            .estimate(self.options.tap_count)
            .await
            .with_context(format!("tapping '{}'", track.name));

        if let Some(device_id) = device.as_deref() {
            let paused = self.provider.pause(device_id).await;
            match (&estimated, paused) {
                (Ok(_), Err(e)) => return Err(e.into()),
                (Err(_), Err(e)) => tracing::warn!("Pause after failed tapping also failed: {}", e),
                _ => {}
            }
        }

        estimated
    }

    /// Analyse every track, reorder on full success, always save the cache.
    pub async fn run(
        self,
        selection: &PlaylistSelection,
        tracks: Vec<Track>,
        observer: &mut impl FnMut(SessionEvent),
    ) -> Result<SessionReport> {
        self.run_until(selection, tracks, observer, std::future::pending::<()>())
            .await
    }

    /// Like [`Session::run`], stopping with [`Error::Interrupted`] when
    /// `cancel` completes during tapping. Once the reorder has started it
    /// runs to the end; the playlist is never left half-written.
    pub async fn run_until(
        mut self,
        selection: &PlaylistSelection,
        mut tracks: Vec<Track>,
        observer: &mut impl FnMut(SessionEvent),
        cancel: impl Future,
    ) -> Result<SessionReport> {
        let analysed = tokio::select! {
            analysed = self.analyse(&mut tracks, observer) => analysed,
            _ = cancel => {
                tracing::info!("Session interrupted");
                Err(Error::Interrupted)
            }
        };

        let outcome = match analysed {
            Ok(outcomes) => {
                reorder::sort_by_tempo(&mut tracks);
                observer(SessionEvent::Committing {
                    tracks: tracks.len(),
                });
                match reorder::commit_order(self.provider, selection, &tracks).await {
                    Ok(commit) => Ok(SessionReport {
                        tracks,
                        outcomes,
                        commit,
                    }),
                    Err(e) => Err(self.commit_failed(selection, e)),
                }
            }
            Err(e) => Err(e),
        };

        let persisted = self.cache.finish();
        match (outcome, persisted) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cache)) => Err(Error::Unsaved {
                source: Box::new(e),
                cache,
            }),
        }
    }

    /// Turn a failed reorder into an error, writing down any tracks the
    /// playlist lost so they can be restored later.
    fn commit_failed(&self, selection: &PlaylistSelection, error: CommitError) -> Error {
        match error {
            CommitError::Intact(e) => Error::from(e).context("writing the new playlist order"),
            CommitError::Incomplete { missing, source } => {
                let pending = PendingTracks::new(selection, missing);
                let path = PendingTracks::path_for(self.cache.path());
                let saved_to = match pending.save(&path) {
                    Ok(()) => Some(path),
                    Err(e) => {
                        tracing::error!(
                            "Could not write {:?} ({}); missing tracks: {}",
                            path,
                            e,
                            pending.uris.join(" ")
                        );
                        None
                    }
                };
                Error::PartialCommit {
                    missing: pending.uris.len(),
                    saved_to,
                    source,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::CacheError;
    use crate::spotify::ProviderError;
    use crate::spotify::traits::mocks::{Call, MockProvider};
    use crate::tempo::TempoError;
    use crate::tempo::mocks::SpyEstimator;
    use crate::test_utils::{mock_selection, mock_track, mock_tracks, temp_cache_path};

    fn options(policy: MergePolicy, device: Option<&str>) -> SessionOptions {
        SessionOptions {
            tap_count: 8,
            head_start: Duration::from_secs(30),
            policy,
            device_id: device.map(str::to_string),
            rest: Duration::ZERO,
        }
    }

    fn cache_with(path: &std::path::Path, known: &[(&str, f64)]) -> TempoCache {
        let mut cache = TempoCache::new(path);
        for (order, (id, bpm)) in known.iter().enumerate() {
            cache.merge(&mock_track(id, order), *bpm, MergePolicy::Replace);
        }
        cache
    }

    fn ignore(_: SessionEvent) {}

    #[tokio::test]
    async fn test_full_run_sorts_and_commits() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new();
        let spy = SpyEstimator::returning([130, 70, 95]);
        let session = Session::new(
            &provider,
            spy,
            TempoCache::new(&path),
            options(MergePolicy::Replace, None),
        );

        let report = session
            .run(&mock_selection(), mock_tracks(&["a", "b", "c"]), &mut ignore)
            .await
            .unwrap();

        let order: Vec<&str> = report.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(report.tapped(), 3);
        assert!(matches!(
            provider.calls().last(),
            Some(Call::Add { uris }) if uris[0] == "spotify:track:b"
        ));
        assert_eq!(TempoCache::load(&path).len(), 3);
    }

    #[tokio::test]
    async fn test_replace_overwrites_cached_tempos() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new();
        let spy = SpyEstimator::returning([130, 95]);
        let session = Session::new(
            &provider,
            spy,
            cache_with(&path, &[("a", 120.0), ("c", 90.0)]),
            options(MergePolicy::Replace, None),
        );

        let report = session
            .run(&mock_selection(), mock_tracks(&["a", "c"]), &mut ignore)
            .await
            .unwrap();

        let tempos: Vec<(&str, Option<f64>)> = report
            .tracks
            .iter()
            .map(|t| (t.id.as_str(), t.bpm))
            .collect();
        assert_eq!(tempos, vec![("c", Some(95.0)), ("a", Some(130.0))]);
    }

    #[tokio::test]
    async fn test_average_with_cached_tempo() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new();
        let mut session = Session::new(
            &provider,
            SpyEstimator::returning([120]),
            cache_with(&path, &[("a", 100.0)]),
            options(MergePolicy::Average, None),
        );

        let mut tracks = mock_tracks(&["a"]);
        let outcomes = session.analyse(&mut tracks, &mut ignore).await.unwrap();

        assert_eq!(outcomes, vec![TrackOutcome::Tapped { tapped: 120, stored: 110.0 }]);
        assert_eq!(tracks[0].bpm, Some(110.0));
        assert_eq!(session.cache().lookup("a"), Some(110.0));
    }

    #[tokio::test]
    async fn test_skip_never_calls_estimator_for_known_tracks() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new().with_device("d1");
        let mut session = Session::new(
            &provider,
            SpyEstimator::returning([90]),
            cache_with(&path, &[("a", 100.0)]),
            options(MergePolicy::Skip, Some("d1")),
        );

        let mut tracks = mock_tracks(&["a", "b"]);
        let mut events = Vec::new();
        session
            .analyse(&mut tracks, &mut |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(session.estimator.calls, 1);
        assert_eq!(tracks[0].bpm, Some(100.0));
        assert_eq!(tracks[1].bpm, Some(90.0));
        assert_eq!(session.cache().lookup("a"), Some(100.0));
        // Only the unknown track was played
        assert_eq!(provider.playback_starts(), 1);
        assert!(matches!(events[0], SessionEvent::Recalled { bpm, .. } if bpm == 100.0));
    }

    #[tokio::test]
    async fn test_playback_sequence_per_track() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new().with_device("d1");
        let mut session = Session::new(
            &provider,
            SpyEstimator::returning([100]),
            TempoCache::new(&path),
            options(MergePolicy::Replace, Some("d1")),
        );

        let mut tracks = mock_tracks(&["a"]);
        session.analyse(&mut tracks, &mut ignore).await.unwrap();

        assert_eq!(
            provider.calls(),
            vec![
                Call::StartPlayback {
                    device_id: "d1".to_string(),
                    uri: "spotify:track:a".to_string()
                },
                Call::Seek {
                    device_id: "d1".to_string(),
                    position: Duration::from_secs(30)
                },
                Call::Pause {
                    device_id: "d1".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_error_keeps_progress_and_skips_reorder() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new().with_device("d1").failing_playback_on(3);
        let session = Session::new(
            &provider,
            SpyEstimator::returning([100, 110, 120, 130, 140]),
            TempoCache::new(&path),
            options(MergePolicy::Replace, Some("d1")),
        );

        let result = session
            .run(
                &mock_selection(),
                mock_tracks(&["a", "b", "c", "d", "e"]),
                &mut ignore,
            )
            .await;

        assert!(matches!(result, Err(Error::Provider(ProviderError::Api { .. }))));
        assert!(!provider.reordered());

        let saved = TempoCache::load(&path);
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.lookup("a"), Some(100.0));
        assert_eq!(saved.lookup("b"), Some(110.0));
    }

    #[tokio::test]
    async fn test_invalid_timing_aborts_and_pauses() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new().with_device("d1");
        let spy = SpyEstimator::with_results([
            Ok(100),
            Err(TempoError::InvalidTiming("taps span zero time".to_string())),
        ]);
        let session = Session::new(
            &provider,
            spy,
            TempoCache::new(&path),
            options(MergePolicy::Replace, Some("d1")),
        );

        let err = session
            .run(&mock_selection(), mock_tracks(&["a", "b", "c"]), &mut ignore)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Invalid tap timing"));
        assert!(err.to_string().contains("Track b"));
        assert!(matches!(provider.calls().last(), Some(Call::Pause { .. })));
        assert!(!provider.reordered());
        assert_eq!(TempoCache::load(&path).len(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_still_saves_cache() {
        let (path, _dir) = temp_cache_path();
        let mut provider = MockProvider::new();
        provider.modify_error = Some(ProviderError::Network("offline".to_string()));
        let session = Session::new(
            &provider,
            SpyEstimator::returning([100]),
            TempoCache::new(&path),
            options(MergePolicy::Replace, None),
        );

        let err = session
            .run(&mock_selection(), mock_tracks(&["a"]), &mut ignore)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WithContext { .. }));
        assert_eq!(TempoCache::load(&path).lookup("a"), Some(100.0));
    }

    /// A cache path whose parent is a regular file, so persisting fails.
    fn unwritable_cache_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        blocker.join("bpm-checker.json")
    }

    #[tokio::test]
    async fn test_failed_run_reports_unsaved_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::new().with_device("d1").failing_playback_on(2);
        let session = Session::new(
            &provider,
            SpyEstimator::returning([100, 110]),
            TempoCache::new(unwritable_cache_path(&dir)),
            options(MergePolicy::Replace, Some("d1")),
        );

        let err = session
            .run(&mock_selection(), mock_tracks(&["a", "b"]), &mut ignore)
            .await
            .unwrap_err();

        let Error::Unsaved { source, cache } = &err else {
            panic!("expected an unsaved-cache error, got {:?}", err);
        };
        assert!(matches!(source.root(), Error::Provider(ProviderError::Api { .. })));
        assert!(matches!(cache, CacheError::Write(_, _)));
    }

    #[tokio::test]
    async fn test_sorted_run_reports_cache_write_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::new();
        let session = Session::new(
            &provider,
            SpyEstimator::returning([100]),
            TempoCache::new(unwritable_cache_path(&dir)),
            options(MergePolicy::Replace, None),
        );

        let err = session
            .run(&mock_selection(), mock_tracks(&["a"]), &mut ignore)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cache(CacheError::Write(_, _))));
        assert!(provider.reordered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_tracks_are_written_down() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new().failing_adds(usize::MAX);
        let session = Session::new(
            &provider,
            SpyEstimator::returning([130, 95]),
            TempoCache::new(&path),
            options(MergePolicy::Replace, None),
        );

        let err = session
            .run(&mock_selection(), mock_tracks(&["a", "b"]), &mut ignore)
            .await
            .unwrap_err();

        let pending_path = PendingTracks::path_for(&path);
        assert!(matches!(
            &err,
            Error::PartialCommit { missing: 2, saved_to: Some(p), .. } if *p == pending_path
        ));
        let pending = PendingTracks::load(&pending_path).unwrap().unwrap();
        assert_eq!(pending.playlist_id, "playlist-1");
        assert_eq!(pending.uris, vec!["spotify:track:b", "spotify:track:a"]);
        // Tempos are kept regardless
        assert_eq!(TempoCache::load(&path).len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_saves_and_reports() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new();
        let estimator = StallingEstimator {
            tempos: VecDeque::from([128]),
        };
        let session = Session::new(
            &provider,
            estimator,
            TempoCache::new(&path),
            options(MergePolicy::Replace, None),
        );

        let err = session
            .run_until(
                &mock_selection(),
                mock_tracks(&["a", "b"]),
                &mut ignore,
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Interrupted));
        assert!(!provider.reordered());
        assert_eq!(TempoCache::load(&path).lookup("a"), Some(128.0));
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_unsaved_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = MockProvider::new();
        let session = Session::new(
            &provider,
            StallingEstimator {
                tempos: VecDeque::new(),
            },
            TempoCache::new(unwritable_cache_path(&dir)),
            options(MergePolicy::Replace, None),
        );

        let err = session
            .run_until(
                &mock_selection(),
                mock_tracks(&["a"]),
                &mut ignore,
                std::future::ready(()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unsaved { .. }));
        assert!(matches!(err.root(), Error::Interrupted));
    }

    /// Hands out the given tempos, then never finishes (a user who walked away).
    struct StallingEstimator {
        tempos: VecDeque<u32>,
    }

    #[async_trait]
    impl TempoEstimator for StallingEstimator {
        async fn estimate(&mut self, _tap_count: u32) -> std::result::Result<u32, TempoError> {
            match self.tempos.pop_front() {
                Some(bpm) => Ok(bpm),
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_dropped_run_still_saves_cache() {
        let (path, _dir) = temp_cache_path();
        let provider = MockProvider::new();
        let estimator = StallingEstimator {
            tempos: VecDeque::from([128]),
        };
        let session = Session::new(
            &provider,
            estimator,
            TempoCache::new(&path),
            options(MergePolicy::Replace, None),
        );

        let selection = mock_selection();
        let mut observer = ignore;
        let run = session.run(&selection, mock_tracks(&["a", "b"]), &mut observer);
        let interrupted = tokio::time::timeout(Duration::from_millis(50), run).await;

        assert!(interrupted.is_err());
        assert!(!provider.reordered());
        assert_eq!(TempoCache::load(&path).lookup("a"), Some(128.0));
    }
}
