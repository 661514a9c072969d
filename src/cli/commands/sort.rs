//! Interactive sort command.
//!
//! Logs in, asks which playlist to sort and how, runs the tapping session
//! and prints the new order. Ctrl-C stops the run; tempos tapped so far are
//! still written to the cache.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncBufRead;
use tokio::runtime::Runtime;

use super::login;
use crate::cache::{MergePolicy, TempoCache};
use crate::config::{Config, SessionConfig};
use crate::error::{Error, Result, ResultExt};
use crate::model::{Device, PlaylistSelection, Track, User};
use crate::prompt::{Console, validate};
use crate::reorder::PendingTracks;
use crate::session::{Session, SessionEvent, SessionOptions, SessionReport};
use crate::spotify::{PlaylistProvider, ProviderError, SpotifyClient};
use crate::tempo::TapEstimator;

const MIN_TAP_COUNT: u32 = 2;

/// Run one sort session against stdin
pub fn cmd_sort(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    let pending_path = PendingTracks::path_for(&config.session.cache_path);
    if let Some(notice) = pending_notice(&pending_path) {
        anyhow::bail!(notice);
    }

    match rt.block_on(sort(config)) {
        Ok(Some(report)) => {
            print_report(&report);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(Abort {
            error: error @ Error::Provider(ProviderError::Authentication(_)),
            ..
        }) => Err(error.into()),
        Err(abort) => {
            eprintln!("\n{}", abort.error);
            eprintln!("{}", abort_notice(&abort));
            std::process::exit(1);
        }
    }
}

/// A sort that ended early.
#[derive(Debug)]
struct Abort {
    error: Error,
    /// Whether tapping had begun, so the cache or playlist may have changed
    session_started: bool,
}

impl From<Error> for Abort {
    fn from(error: Error) -> Self {
        Self {
            error,
            session_started: false,
        }
    }
}

/// Everything asked for before the first track plays.
struct Prepared<R> {
    client: SpotifyClient,
    selection: PlaylistSelection,
    tracks: Vec<Track>,
    options: SessionOptions,
    console: Console<R>,
}

async fn sort(config: &Config) -> std::result::Result<Option<SessionReport>, Abort> {
    let prepared = tokio::select! {
        prepared = prepare(config, Console::stdin()) => prepared?,
        _ = tokio::signal::ctrl_c() => return Err(Error::Interrupted.into()),
    };
    let Some(Prepared {
        client,
        selection,
        tracks,
        options,
        console,
    }) = prepared
    else {
        return Ok(None);
    };

    let cache = TempoCache::load(&config.session.cache_path);
    let session = Session::new(&client, TapEstimator::new(console), cache, options);
    session
        .run_until(&selection, tracks, &mut print_event, tokio::signal::ctrl_c())
        .await
        .map(Some)
        .map_err(|error| Abort {
            error,
            session_started: true,
        })
}

async fn prepare<R>(config: &Config, mut console: Console<R>) -> Result<Option<Prepared<R>>>
where
    R: AsyncBufRead + Unpin + Send,
{
    let client = login::login(config, &mut console).await?;
    let user = client.current_user().await.map_err(|e| match e {
        ProviderError::Unauthorized => {
            ProviderError::Authentication("Spotify rejected the access token".to_string())
        }
        other => other,
    })?;
    println!(
        "Logged in as {}",
        user.display_name.as_deref().unwrap_or(&user.id)
    );

    let Some(selection) = select_playlist(&client, &user, &mut console).await? else {
        return Ok(None);
    };

    let tracks = client
        .playlist_tracks(&selection.playlist_id)
        .await
        .with_context(format!("fetching the tracks of '{}'", selection.name))?;
    if tracks.is_empty() {
        println!("'{}' has no tracks to sort.", selection.name);
        return Ok(None);
    }
    tracing::info!("Sorting {} tracks of {}", tracks.len(), selection.playlist_id);

    let options = ask_options(&client, &config.session, &mut console).await?;
    Ok(Some(Prepared {
        client,
        selection,
        tracks,
        options,
        console,
    }))
}

/// Refuse to start while an earlier failed reorder still owes tracks;
/// another failure would overwrite the list.
fn pending_notice(path: &Path) -> Option<String> {
    match PendingTracks::load(path) {
        Ok(Some(pending)) => Some(format!(
            "{} tracks taken out of '{}' by an earlier run are still missing (listed in {}). \
             Run `bpm-sorter restore` first.",
            pending.uris.len(),
            pending.playlist_name,
            path.display()
        )),
        Ok(None) => None,
        Err(e) => Some(format!(
            "Could not read the list of missing tracks in {}: {}",
            path.display(),
            e
        )),
    }
}

/// What the user should know after an abort, beyond the error itself.
fn abort_notice(abort: &Abort) -> String {
    if !abort.session_started {
        return "Nothing was tapped and the playlist is unchanged.".to_string();
    }
    match &abort.error {
        Error::Cache(_) => "The playlist is sorted, but the tempos could not be saved.".to_string(),
        Error::Unsaved { source, .. } => match restore_hint(source.root()) {
            Some(hint) => format!("The tempos tapped in this run could not be saved. {}", hint),
            None => "The tempos tapped in this run could not be saved. Nothing is sorted."
                .to_string(),
        },
        other => match restore_hint(other.root()) {
            Some(hint) => format!("Songs analysed until now have been saved. {}", hint),
            None => "Songs analysed until now have been saved. Nothing is sorted.".to_string(),
        },
    }
}

fn restore_hint(error: &Error) -> Option<String> {
    match error {
        Error::PartialCommit {
            saved_to: Some(path),
            ..
        } => Some(format!(
            "The missing tracks are listed in {}; run `bpm-sorter restore` to put them back.",
            path.display()
        )),
        Error::PartialCommit { saved_to: None, .. } => {
            Some("The missing tracks are listed in the log above; add them back by hand.".to_string())
        }
        _ => None,
    }
}

/// Ask for a playlist until the user confirms one. `None` when there is
/// nothing the user may edit.
async fn select_playlist<P, R>(
    provider: &P,
    user: &User,
    console: &mut Console<R>,
) -> Result<Option<PlaylistSelection>>
where
    P: PlaylistProvider + ?Sized,
    R: AsyncBufRead + Unpin + Send,
{
    let playlists = provider
        .user_playlists(&user.id)
        .await
        .with_context("listing your playlists")?;
    if playlists.is_empty() {
        println!("You have no playlists you can edit.");
        return Ok(None);
    }

    let labels: Vec<String> = playlists
        .iter()
        .map(|p| format!("{} ({} tracks)", p.name, p.total_tracks))
        .collect();

    loop {
        println!("\nYour playlists:");
        let index = console
            .menu("Which playlist do you want to sort? ", &labels, None)
            .await?;
        let playlist = &playlists[index];

        let answer = console
            .read_line(&format!("Sort '{}'? Type y to confirm: ", playlist.name))
            .await?;
        if validate::is_confirmation(&answer) {
            return Ok(Some(PlaylistSelection::from(playlist)));
        }
    }
}

async fn ask_options<P, R>(
    provider: &P,
    defaults: &SessionConfig,
    console: &mut Console<R>,
) -> Result<SessionOptions>
where
    P: PlaylistProvider + ?Sized,
    R: AsyncBufRead + Unpin + Send,
{
    let default_taps = defaults.tap_count.max(MIN_TAP_COUNT);
    let tap_count = console
        .ask(
            &format!("How many taps per song? [{}] ", default_taps),
            |input| validate::parse_count(input, default_taps, MIN_TAP_COUNT),
        )
        .await?;

    let head_start = console
        .ask(
            &format!(
                "Start playback how many seconds into each song? [{}] ",
                defaults.head_start_secs
            ),
            |input| validate::parse_count(input, defaults.head_start_secs, 0),
        )
        .await?;

    println!("\nWhat to do with songs that already have a bpm:");
    for index in 0..3 {
        if let Some(policy) = MergePolicy::from_index(index) {
            println!("{: <4} {}", index, policy);
        }
    }
    let policy = console
        .ask("Choice [1] ", |input| {
            validate::parse_policy(input, MergePolicy::Replace)
        })
        .await?;

    let autoplay = console
        .ask("Play each song automatically? [Y/n] ", |input| {
            validate::parse_yes_no(input, Some(true))
        })
        .await?;
    let device_id = if autoplay {
        select_device(provider, console).await?
    } else {
        None
    };

    Ok(SessionOptions {
        tap_count,
        head_start: Duration::from_secs(u64::from(head_start)),
        policy,
        device_id,
        rest: Duration::from_millis(defaults.rest_ms),
    })
}

async fn select_device<P, R>(provider: &P, console: &mut Console<R>) -> Result<Option<String>>
where
    P: PlaylistProvider + ?Sized,
    R: AsyncBufRead + Unpin + Send,
{
    let devices = provider
        .devices()
        .await
        .with_context("listing playback devices")?;
    if devices.is_empty() {
        println!("No playback devices found. Open Spotify somewhere and play the songs yourself.");
        return Ok(None);
    }

    let default = default_device(&devices);
    let labels: Vec<String> = devices
        .iter()
        .map(|d| {
            if d.is_active {
                format!("{} (active)", d.name)
            } else {
                d.name.clone()
            }
        })
        .collect();

    println!("\nPlayback devices:");
    let index = console
        .menu(
            &format!("Play on which device? [{}] ", default),
            &labels,
            Some(default),
        )
        .await?;
    Ok(Some(devices[index].id.clone()))
}

fn default_device(devices: &[Device]) -> usize {
    devices.iter().position(|d| d.is_active).unwrap_or(0)
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::Recalled { name, bpm } => {
            println!("{} is known at {} bpm, skipping.", name, bpm);
        }
        SessionEvent::Analysing {
            name,
            position,
            total,
            tap_count,
        } => {
            println!("\n[{}/{}] {}", position, total, name);
            println!(
                "Press enter {} times along with the beat. Type rs to start over.",
                tap_count
            );
        }
        SessionEvent::Tapped {
            tapped,
            prior,
            stored,
            policy,
            ..
        } => match (prior, policy) {
            (Some(prior), MergePolicy::Average) => {
                println!("Tapped {} bpm, averaged with {}: {} bpm", tapped, prior, stored);
            }
            (Some(prior), _) => println!("Tapped {} bpm (was {})", tapped, prior),
            (None, _) => println!("Tapped {} bpm", tapped),
        },
        SessionEvent::Committing { tracks } => {
            println!("\nWriting the new order of {} tracks...", tracks);
        }
    }
}

fn print_report(report: &SessionReport) {
    println!();
    for track in &report.tracks {
        match track.bpm {
            Some(bpm) => println!("{:>7.1}  {}", bpm, track.display_name()),
            None => println!("      ?  {}", track.display_name()),
        }
    }
    println!(
        "\nAll {} tracks finished processing ({} tapped).",
        report.tracks.len(),
        report.tapped()
    );
    println!(
        "Playlist rewritten with {} removal and {} addition requests (snapshot {}).",
        report.commit.removed_batches, report.commit.added_batches, report.commit.snapshot_id
    );
}
