// src/channel/mod.rs

//! Channel reconciliation
//!
//! Keeps the build index in step with what the configured channels
//! actually contain:
//!
//! 1. records a channel no longer lists are deleted
//! 2. new entries are hashed, either by copying the hash of the same
//!    artifact already known from another channel (mirrors), or by
//!    downloading the artifact and hashing its embedded recipe
//! 3. channels that are no longer configured are dropped with their records
//!
//! Downloads and hashing of one channel's new artifacts run in parallel;
//! all index writes happen afterwards, from the calling thread.

pub mod artifact;
pub mod client;
pub mod repodata;

use crate::db::models::{Channel, PackageRecord};
use crate::error::{Error, Result};
use crate::index::BuildIndex;
use crate::recipe::hasher::RecipeHasher;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub use client::{ChannelClient, ChannelFetcher};
pub use repodata::{PackageInfo, RepoData};

type PackageKey = (String, String, i64);

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Configured channels whose index was read
    pub indexed: usize,
    /// Configured channels without an index yet
    pub uninitialized: usize,
    /// Records already known for their channel
    pub unchanged: usize,
    /// Records copied from a mirror in another channel
    pub cloned: usize,
    /// Records whose artifact was downloaded and hashed
    pub hashed: usize,
    /// Records deleted because their channel stopped listing them
    pub removed: usize,
    /// Channels dropped because they are no longer configured
    pub purged_channels: usize,
}

impl ReconcileStats {
    /// Whether the pass left the index untouched
    pub fn is_noop(&self) -> bool {
        self.cloned == 0 && self.hashed == 0 && self.removed == 0 && self.purged_channels == 0
    }
}

/// Synchronizes a build index with channel contents
pub struct ChannelReconciler<'a> {
    index: &'a dyn BuildIndex,
    fetcher: &'a dyn ChannelFetcher,
    hasher: &'a RecipeHasher,
    platform: &'a str,
    show_progress: bool,
}

impl<'a> ChannelReconciler<'a> {
    pub fn new(
        index: &'a dyn BuildIndex,
        fetcher: &'a dyn ChannelFetcher,
        hasher: &'a RecipeHasher,
        platform: &'a str,
    ) -> Self {
        Self {
            index,
            fetcher,
            hasher,
            platform,
            show_progress: false,
        }
    }

    /// Draw a progress bar per channel
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Bring the index up to date with `channels` (in order), then forget
    /// every channel not in that list
    pub fn reconcile(&self, channels: &[String]) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();
        let mut configured = HashSet::new();

        for url in channels {
            let channel = self.index.ensure_channel(url)?;
            let id = channel_id(&channel)?;
            configured.insert(id);
            self.reconcile_channel(&channel, id, &mut stats)?;
        }

        for channel in self.index.channels()? {
            let id = channel_id(&channel)?;
            if !configured.contains(&id) {
                info!("Purging cached data for {}", channel.url);
                self.index.delete_channel(id)?;
                stats.purged_channels += 1;
            }
        }

        Ok(stats)
    }

    fn reconcile_channel(
        &self,
        channel: &Channel,
        channel_id: i64,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        info!("Updating build index from {}{}", channel.url, self.platform);

        let Some(repodata) = self.fetcher.fetch_repodata(&channel.url, self.platform)? else {
            info!("{}{} has no index yet, skipping", channel.url, self.platform);
            stats.uninitialized += 1;
            return Ok(());
        };
        stats.indexed += 1;

        let listing = repodata.by_key();

        // Forget artifacts that disappeared from the channel
        let mut known: HashSet<PackageKey> = HashSet::new();
        for record in self.index.records_for_channel(channel_id)? {
            let key = (record.name.clone(), record.version.clone(), record.build_number);
            if listing.contains_key(&key) {
                known.insert(key);
            } else if let Some(id) = record.id {
                debug!("{}-{}-{} removed from {}", key.0, key.1, key.2, channel.url);
                self.index.delete_record(id)?;
                stats.removed += 1;
            }
        }

        let mut entries: Vec<(&PackageKey, &str)> = listing
            .iter()
            .map(|(key, (filename, _))| (key, *filename))
            .collect();
        entries.sort();

        let progress = self.progress_bar(entries.len() as u64, &channel.url);

        let mut to_hash = Vec::new();
        for (key, filename) in entries {
            if known.contains(key) {
                stats.unchanged += 1;
                progress.inc(1);
                continue;
            }

            if let Some(mirror) = self.index.find_key(&key.0, &key.1, key.2)? {
                let mut record = mirror;
                record.id = None;
                record.channel_id = channel_id;
                record.filename = Some(filename.to_string());
                self.index.insert(&record)?;
                stats.cloned += 1;
                progress.inc(1);
                continue;
            }

            to_hash.push((key, filename));
        }

        let (fetcher, hasher, platform) = (self.fetcher, self.hasher, self.platform);
        let hashed: Vec<Result<(&PackageKey, &str, String)>> = to_hash
            .par_iter()
            .map(|(key, filename)| {
                let digest =
                    hash_remote_artifact(fetcher, hasher, &channel.url, platform, filename)?;
                progress.inc(1);
                Ok((*key, *filename, digest))
            })
            .collect();

        for result in hashed {
            let (key, filename, digest) = result?;
            if let Ok(previous) = self.index.lookup(&key.0, &key.1, &digest) {
                if previous != key.2 {
                    warn!(
                        "{}-{}: build {} has the same recipe as build {}",
                        key.0, key.1, key.2, previous
                    );
                }
            }

            let mut record =
                PackageRecord::new(channel_id, key.0.clone(), key.1.clone(), key.2, digest);
            record.filename = Some(filename.to_string());
            self.index.insert(&record)?;
            stats.hashed += 1;
        }

        progress.finish_and_clear();
        self.index.touch_channel(channel_id)?;
        Ok(())
    }

    fn progress_bar(&self, len: u64, url: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );
        pb.set_message(url.to_string());
        pb
    }

    /// Artifacts built locally that no remote channel has yet
    pub fn local_only_artifacts(&self) -> Result<Vec<PathBuf>> {
        local_only_artifacts(self.index, self.platform)
    }
}

/// Paths (`<channel dir>/<platform>/<filename>`) of records in `file://`
/// channels whose (name, version, build number) no other kind of channel
/// lists
pub fn local_only_artifacts(index: &dyn BuildIndex, platform: &str) -> Result<Vec<PathBuf>> {
    let channels: HashMap<i64, Channel> = index
        .channels()?
        .into_iter()
        .filter_map(|c| c.id.map(|id| (id, c)))
        .collect();
    let records = index.all_records()?;

    let is_local = |record: &PackageRecord| {
        channels
            .get(&record.channel_id)
            .is_some_and(Channel::is_local)
    };

    let remote: HashSet<(&str, &str, i64)> = records
        .iter()
        .filter(|r| !is_local(r))
        .map(PackageRecord::key)
        .collect();

    let mut paths = Vec::new();
    for record in records.iter().filter(|r| is_local(r)) {
        if remote.contains(&record.key()) {
            continue;
        }
        let Some(filename) = record.filename.as_deref() else {
            warn!(
                "{}-{}-{} has no recorded file name, run reindex",
                record.name, record.version, record.build_number
            );
            continue;
        };
        let Some(channel) = channels.get(&record.channel_id) else {
            continue;
        };
        let url = client::platform_url(&channel.url, platform, filename)?;
        paths.push(client::local_path(&url)?);
    }

    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Download one artifact to a temporary file and hash its recipe
fn hash_remote_artifact(
    fetcher: &dyn ChannelFetcher,
    hasher: &RecipeHasher,
    channel_url: &str,
    platform: &str,
    filename: &str,
) -> Result<String> {
    let download = tempfile::Builder::new()
        .prefix("recipegen-")
        .suffix(&format!("-{filename}"))
        .tempfile()
        .map_err(|e| Error::IoError(format!("Failed to create temporary file: {e}")))?;

    fetcher.fetch_artifact(channel_url, platform, filename, download.path())?;
    let digest = artifact::hash_artifact(download.path(), hasher)?;
    debug!("{}: {}", filename, digest.digest);
    Ok(digest.digest)
}

fn channel_id(channel: &Channel) -> Result<i64> {
    channel
        .id
        .ok_or_else(|| Error::InitError(format!("Channel {} has no ID", channel.url)))
}
