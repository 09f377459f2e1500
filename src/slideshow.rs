//! The per-page slideshow: a frame ring stepped by a recurring timer.
//!
//! [`FrameSequence`] is the sans-IO controller mirrored by the browser
//! runtime. Frame discovery runs on the server: [`discover_frames`] lists an
//! animation folder in manifest mode, or probes numbered file names in the
//! legacy mode.

use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context as _;
use serde::{Serialize, Serializer};

use crate::cli::{FrameDiscovery, FramesArgs};
use crate::formats::PageDocument;
use crate::protocol::FrameCommand;
use crate::story_store::{StoryName, StoryStore};

pub const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const PROBE_MAX_INDEX: u32 = 200;
const PROBE_MAX_CONSECUTIVE_MISSES: u32 = 5;
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLabel {
    Play,
    Loading,
    Stop,
}

/// Normalized slideshow settings. Rendered pages embed this as JSON under
/// [`SLIDESHOW_CONFIG_ELEMENT_ID`] so the browser runtime never re-derives it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideshowConfig {
    pub folder: String,
    #[serde(rename = "intervalMs", serialize_with = "serialize_millis")]
    pub interval: Duration,
    /// CSS width percentage of the frame image, passed through as given.
    pub scale: String,
    /// CSS `left` percentage of the frame container, passed through as given.
    pub position: String,
    pub audio: Option<String>,
}

pub const SLIDESHOW_CONFIG_ELEMENT_ID: &str = "slideshowConfig";

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

impl SlideshowConfig {
    pub fn from_document(doc: &PageDocument) -> Self {
        let interval = doc
            .animation_interval
            .as_ref()
            .map(|v| v.as_f64())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map_or(DEFAULT_FRAME_INTERVAL, Duration::from_secs_f64);
        Self {
            folder: doc.animation_folder.clone().unwrap_or_default(),
            interval,
            scale: doc
                .animation_scale
                .as_ref()
                .map_or_else(|| "100".to_owned(), ToString::to_string),
            position: doc
                .animation_position
                .as_ref()
                .map_or_else(|| "0".to_owned(), ToString::to_string),
            audio: doc
                .animation_audio
                .clone()
                .filter(|a| !a.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameTimerId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum SlideshowEffect {
    Alert(String),
    SetButtonLabel(ButtonLabel),
    /// Fetch the frame manifest; answer with [`FrameSequence::on_frames`].
    RequestFrames { folder: String, generation: u64 },
    MountContainer { position: String, scale: String },
    ShowFrame { index: usize, src: String },
    PlayAudio { url: String },
    StopAudio,
    StartTimer { timer: FrameTimerId, every: Duration },
    ClearTimer(FrameTimerId),
    RemoveContainer,
    /// Start the page's narration and background video if both are paused.
    StartMedia,
}

pub fn wrap_next(index: usize, len: usize) -> usize {
    if len == 0 { 0 } else { (index + 1) % len }
}

pub fn wrap_prev(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if index == 0 {
        len - 1
    } else {
        index - 1
    }
}

#[derive(Debug, Clone)]
pub struct FrameSequence {
    config: SlideshowConfig,
    state: SlideshowState,
    loading: bool,
    frames: Vec<String>,
    index: usize,
    timer: Option<FrameTimerId>,
    next_timer: u64,
    generation: u64,
    audio_bound: bool,
}

impl FrameSequence {
    pub fn new(config: SlideshowConfig) -> Self {
        Self {
            config,
            state: SlideshowState::Stopped,
            loading: false,
            frames: Vec::new(),
            index: 0,
            timer: None,
            next_timer: 0,
            generation: 0,
            audio_bound: false,
        }
    }

    pub fn state(&self) -> SlideshowState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timer(&self) -> Option<FrameTimerId> {
        self.timer
    }

    /// The slideshow button: starts when idle, stops otherwise.
    pub fn on_button(&mut self) -> Vec<SlideshowEffect> {
        if self.state != SlideshowState::Stopped || self.loading {
            self.stop()
        } else {
            self.start()
        }
    }

    fn start(&mut self) -> Vec<SlideshowEffect> {
        if self.config.folder.trim().is_empty() {
            return vec![SlideshowEffect::Alert(
                "No slideshow folder is configured for this page".to_owned(),
            )];
        }
        self.generation += 1;
        self.loading = true;
        vec![
            SlideshowEffect::SetButtonLabel(ButtonLabel::Loading),
            SlideshowEffect::RequestFrames {
                folder: self.config.folder.clone(),
                generation: self.generation,
            },
        ]
    }

    /// Discovery result for the request tagged `generation`. Results from
    /// a request that was superseded or cancelled are dropped.
    pub fn on_frames(&mut self, generation: u64, frames: Vec<String>) -> Vec<SlideshowEffect> {
        if generation != self.generation || !self.loading {
            return Vec::new();
        }
        self.loading = false;
        if frames.is_empty() {
            return vec![
                SlideshowEffect::Alert("No images were found in the slideshow folder".to_owned()),
                SlideshowEffect::SetButtonLabel(ButtonLabel::Play),
            ];
        }

        self.frames = frames;
        self.index = 0;
        self.state = SlideshowState::Playing;

        let mut effects = vec![SlideshowEffect::SetButtonLabel(ButtonLabel::Stop)];
        if let Some(url) = &self.config.audio {
            self.audio_bound = true;
            effects.push(SlideshowEffect::PlayAudio { url: url.clone() });
        }
        effects.push(SlideshowEffect::MountContainer {
            position: self.config.position.clone(),
            scale: self.config.scale.clone(),
        });
        effects.push(self.show_current());
        effects.push(self.arm_timer());
        effects
    }

    fn show_current(&self) -> SlideshowEffect {
        SlideshowEffect::ShowFrame {
            index: self.index,
            src: self.frames.get(self.index).cloned().unwrap_or_default(),
        }
    }

    fn arm_timer(&mut self) -> SlideshowEffect {
        self.next_timer += 1;
        let timer = FrameTimerId(self.next_timer);
        self.timer = Some(timer);
        SlideshowEffect::StartTimer {
            timer,
            every: self.config.interval,
        }
    }

    pub fn on_tick(&mut self, timer: FrameTimerId) -> Vec<SlideshowEffect> {
        if self.timer != Some(timer) || self.state != SlideshowState::Playing {
            return Vec::new();
        }
        self.index = wrap_next(self.index, self.frames.len());
        vec![self.show_current()]
    }

    /// Manual step; leaves the timer's phase alone.
    pub fn next_frame(&mut self) -> Vec<SlideshowEffect> {
        if self.state == SlideshowState::Stopped {
            return Vec::new();
        }
        self.index = wrap_next(self.index, self.frames.len());
        vec![self.show_current()]
    }

    pub fn previous_frame(&mut self) -> Vec<SlideshowEffect> {
        if self.state == SlideshowState::Stopped {
            return Vec::new();
        }
        self.index = wrap_prev(self.index, self.frames.len());
        vec![self.show_current()]
    }

    /// Pausing stops frame stepping only; bound audio keeps playing.
    pub fn toggle_pause(&mut self) -> Vec<SlideshowEffect> {
        match self.state {
            SlideshowState::Stopped => Vec::new(),
            SlideshowState::Playing => {
                self.state = SlideshowState::Paused;
                self.timer
                    .take()
                    .map(SlideshowEffect::ClearTimer)
                    .into_iter()
                    .collect()
            }
            SlideshowState::Paused => {
                self.state = SlideshowState::Playing;
                vec![self.arm_timer()]
            }
        }
    }

    /// Explicit stop, page hidden or unload.
    pub fn stop(&mut self) -> Vec<SlideshowEffect> {
        if self.state == SlideshowState::Stopped && !self.loading {
            return Vec::new();
        }
        let was_mounted = self.state != SlideshowState::Stopped;
        self.state = SlideshowState::Stopped;
        self.loading = false;
        self.generation += 1;

        let mut effects: Vec<_> = self
            .timer
            .take()
            .map(SlideshowEffect::ClearTimer)
            .into_iter()
            .collect();
        if was_mounted {
            effects.push(SlideshowEffect::RemoveContainer);
        }
        if std::mem::take(&mut self.audio_bound) {
            effects.push(SlideshowEffect::StopAudio);
        }
        effects.push(SlideshowEffect::SetButtonLabel(ButtonLabel::Play));
        self.frames.clear();
        self.index = 0;
        effects
    }

    /// Commands sent by the player. The auto-start falls back to the page
    /// media when there is no slideshow to run.
    pub fn on_command(&mut self, command: FrameCommand) -> Vec<SlideshowEffect> {
        match command {
            FrameCommand::NextFrame => self.next_frame(),
            FrameCommand::PreviousFrame => self.previous_frame(),
            FrameCommand::TogglePause => self.toggle_pause(),
            FrameCommand::StartSlideshow if self.config.folder.trim().is_empty() => {
                vec![SlideshowEffect::StartMedia]
            }
            FrameCommand::StartSlideshow => {
                if self.state == SlideshowState::Stopped && !self.loading {
                    self.start()
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// In-page keyboard bindings. `None` leaves the event alone.
    pub fn on_key(&mut self, key: &str) -> Option<Vec<SlideshowEffect>> {
        match key {
            "ArrowUp" => Some(self.next_frame()),
            "ArrowDown" => Some(self.previous_frame()),
            " " => Some(self.toggle_pause()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// List the folder once, ordered by creation time then file name.
    Manifest,
    /// Try `{folder}{n}.{ext}` for increasing `n`.
    Probe,
}

impl DiscoveryMode {
    pub fn from_env() -> anyhow::Result<Self> {
        let raw =
            std::env::var("STORYBOOK_FRAME_DISCOVERY").unwrap_or_else(|_| "manifest".to_string());
        Self::parse(&raw).with_context(|| {
            format!("invalid STORYBOOK_FRAME_DISCOVERY={raw:?}. expected one of: manifest, probe")
        })
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "manifest" => Ok(Self::Manifest),
            "probe" => Ok(Self::Probe),
            other => anyhow::bail!("unsupported frame discovery mode: {other}"),
        }
    }
}

/// Rejects absolute folders and `..` so discovery stays inside the story.
pub fn story_relative(folder: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(folder);
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        anyhow::bail!("animation folder must be relative to the story: {folder}");
    }
    Ok(path.to_path_buf())
}

/// Frame URLs relative to the story folder, in playback order.
pub fn discover_frames(
    story_dir: &Path,
    folder: &str,
    mode: DiscoveryMode,
) -> anyhow::Result<Vec<String>> {
    story_relative(folder)?;
    match mode {
        DiscoveryMode::Manifest => list_frames(story_dir, folder),
        DiscoveryMode::Probe => Ok(probe_frames(story_dir, folder)),
    }
}

pub fn list_frames(story_dir: &Path, folder: &str) -> anyhow::Result<Vec<String>> {
    let dir = story_dir.join(story_relative(folder)?);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found: Vec<(SystemTime, String)> = Vec::new();
    for entry in std::fs::read_dir(&dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_frame_file(&name) {
            continue;
        }
        let meta = entry
            .metadata()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((created, name));
    }
    found.sort_by(|(ta, na), (tb, nb)| ta.cmp(tb).then_with(|| natural_cmp(na, nb)));

    Ok(found
        .into_iter()
        .map(|(_, name)| join_folder(folder, &name))
        .collect())
}

/// Legacy discovery: numbered files from 1, giving up after a run of misses.
pub fn probe_frames(story_dir: &Path, folder: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let mut misses = 0;
    for n in 1..=PROBE_MAX_INDEX {
        if misses >= PROBE_MAX_CONSECUTIVE_MISSES {
            break;
        }
        let hit = FRAME_EXTENSIONS
            .iter()
            .map(|ext| format!("{folder}{n}.{ext}"))
            .find(|candidate| story_dir.join(candidate).is_file());
        match hit {
            Some(path) => {
                misses = 0;
                frames.push(path);
            }
            None => misses += 1,
        }
    }
    frames
}

fn is_frame_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn join_folder(folder: &str, name: &str) -> String {
    if folder.is_empty() || folder.ends_with('/') {
        format!("{folder}{name}")
    } else {
        format!("{folder}/{name}")
    }
}

/// File name ordering where digit runs compare by value (`2.png < 10.png`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let da = take_digits(&mut a);
                let db = take_digits(&mut b);
                let ta = da.trim_start_matches('0');
                let tb = db.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x
                    .to_lowercase()
                    .cmp(y.to_lowercase())
                    .then_with(|| x.cmp(&y));
                if ord != Ordering::Equal {
                    return ord;
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = it.next_if(char::is_ascii_digit) {
        out.push(c);
    }
    out
}

/// Prints the frames of `--folder` as a JSON array.
pub fn run(args: FramesArgs) -> anyhow::Result<()> {
    let story = StoryName::parse(&args.story)?;
    let mode = match args.mode {
        Some(FrameDiscovery::Manifest) => DiscoveryMode::Manifest,
        Some(FrameDiscovery::Probe) => DiscoveryMode::Probe,
        None => DiscoveryMode::from_env()?,
    };
    let story_dir = StoryStore::new(&args.stories_dir).story_dir(&story);
    if !story_dir.is_dir() {
        anyhow::bail!("story not found: {}", story_dir.display());
    }
    let frames = discover_frames(&story_dir, &args.folder, mode)?;
    tracing::debug!(count = frames.len(), ?mode, "frames discovered");
    println!(
        "{}",
        serde_json::to_string_pretty(&frames).context("serialize frames")?
    );
    Ok(())
}
