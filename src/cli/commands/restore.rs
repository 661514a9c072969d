//! Putting back tracks a failed reorder took out of a playlist.

use std::fs;
use std::path::Path;

use tokio::runtime::Runtime;

use super::login;
use crate::config::Config;
use crate::prompt::Console;
use crate::reorder::{self, CommitError, PendingTracks};
use crate::spotify::PlaylistProvider;

/// Append the tracks listed in the pending file to their playlist
pub fn cmd_restore(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    let path = PendingTracks::path_for(&config.session.cache_path);
    let Some(pending) = PendingTracks::load(&path)? else {
        println!("Nothing to restore.");
        return Ok(());
    };

    println!(
        "Putting {} tracks back into '{}'...",
        pending.uris.len(),
        pending.playlist_name
    );
    rt.block_on(async {
        let mut console = Console::stdin();
        let client = login::login(config, &mut console).await?;
        restore(&client, &pending, &path).await
    })
}

/// Add the pending tracks. The file is removed once all of them are back,
/// or rewritten with the ones still missing.
async fn restore<P>(provider: &P, pending: &PendingTracks, path: &Path) -> anyhow::Result<()>
where
    P: PlaylistProvider + ?Sized,
{
    match reorder::restore_pending(provider, pending).await {
        Ok(count) => {
            fs::remove_file(path)?;
            println!("Put {} tracks back into '{}'.", count, pending.playlist_name);
            Ok(())
        }
        Err(CommitError::Incomplete { missing, source }) => {
            let remaining = missing.len();
            PendingTracks {
                uris: missing,
                ..pending.clone()
            }
            .save(path)?;
            anyhow::bail!(
                "{} tracks are still missing from '{}' ({}); run restore again later",
                remaining,
                pending.playlist_name,
                source
            )
        }
        Err(CommitError::Intact(e)) => Err(e.into()),
    }
}
