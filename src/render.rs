//! Page and player HTML generation.
//!
//! Rendering happens in two stages: [`page_document`] builds the element
//! tree (scene markup plus the embedded page document as JSON data), and
//! [`Document::render`] serializes it. Control logic is never emitted inline;
//! pages reference the shared `/assets/page-runtime.js`.

use std::io::Write as _;

use anyhow::Context as _;

use crate::cli::RenderArgs;
use crate::formats::{PageDocument, PlayerSettings, Scalar, TeleportButton, format_number};
use crate::html::{Document, Element, Node, Style, script_json};
use crate::player::{PlayerBoot, PlayerEffect, PlayerSession};
use crate::slideshow::{SLIDESHOW_CONFIG_ELEMENT_ID, SlideshowConfig};
use crate::story_store::PageMap;

pub const PAGE_DATA_ELEMENT_ID: &str = "pageData";
pub const PLAYER_CONFIG_ELEMENT_ID: &str = "playerConfig";

const DEFAULT_SCALE: f64 = 100.0;
const DEFAULT_POS: f64 = 0.0;
const DEFAULT_VISIBLE_WIDTH: f64 = 100.0;
const DEFAULT_CONV_OFFSET_PX: u32 = 50;
const DEFAULT_SCENE_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Cache-busting suffix for runtime asset URLs.
    pub asset_version: String,
    /// When false, title, narration, conversation lines, the slideshow button
    /// and teleport buttons are left out.
    pub subtitles: bool,
}

impl RenderOptions {
    pub fn new(asset_version: impl Into<String>) -> Self {
        Self {
            asset_version: asset_version.into(),
            subtitles: true,
        }
    }

    pub fn now() -> Self {
        Self::new(chrono::Utc::now().timestamp_millis().to_string())
    }

    pub fn without_subtitles(mut self) -> Self {
        self.subtitles = false;
        self
    }

    fn asset_url(&self, name: &str) -> String {
        format!("/assets/{name}?v={}", self.asset_version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Case-sensitive suffix match; unknown extensions yield no element.
    pub fn sniff(url: &str) -> Option<Self> {
        const VIDEO: &[&str] = &[".mp4", ".webm", ".ogg"];
        const IMAGE: &[&str] = &[".jpg", ".png", ".gif", ".webp"];
        if VIDEO.iter().any(|ext| url.ends_with(ext)) {
            Some(Self::Video)
        } else if IMAGE.iter().any(|ext| url.ends_with(ext)) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitlePosition {
    TopLeft,
    Top,
    TopRight,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl TitlePosition {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or_default() {
            "top" => Self::Top,
            "top-right" => Self::TopRight,
            "bottom-left" => Self::BottomLeft,
            "bottom" => Self::Bottom,
            "bottom-right" => Self::BottomRight,
            _ => Self::TopLeft,
        }
    }

    fn style(self) -> Style {
        match self {
            Self::TopLeft => Style::new().decl("left", "10px").decl("top", "10px"),
            Self::Top => Style::new()
                .decl("left", "50%")
                .decl("top", "10px")
                .decl("transform", "translateX(-50%)"),
            Self::TopRight => Style::new().decl("right", "10px").decl("top", "10px"),
            Self::BottomLeft => Style::new().decl("left", "10px").decl("bottom", "10px"),
            Self::Bottom => Style::new()
                .decl("left", "50%")
                .decl("bottom", "10px")
                .decl("transform", "translateX(-50%)"),
            Self::BottomRight => Style::new().decl("right", "10px").decl("bottom", "10px"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAnchor {
    TopLeft,
    Top,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl ButtonAnchor {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "top" => Self::Top,
            "top-right" => Self::TopRight,
            "middle-left" => Self::MiddleLeft,
            "center" => Self::Center,
            "middle-right" => Self::MiddleRight,
            "bottom-left" => Self::BottomLeft,
            "bottom" => Self::Bottom,
            "bottom-right" => Self::BottomRight,
            _ => Self::TopLeft,
        }
    }

    fn style(self) -> Style {
        let s = Style::new();
        match self {
            Self::TopLeft => s.decl("top", "10px").decl("left", "10px"),
            Self::Top => s
                .decl("top", "10px")
                .decl("left", "50%")
                .decl("transform", "translateX(-50%)"),
            Self::TopRight => s.decl("top", "10px").decl("right", "10px"),
            Self::MiddleLeft => s
                .decl("top", "50%")
                .decl("left", "10px")
                .decl("transform", "translateY(-50%)"),
            Self::Center => s
                .decl("top", "50%")
                .decl("left", "50%")
                .decl("transform", "translate(-50%, -50%)"),
            Self::MiddleRight => s
                .decl("top", "50%")
                .decl("right", "10px")
                .decl("transform", "translateY(-50%)"),
            Self::BottomLeft => s.decl("bottom", "10px").decl("left", "10px"),
            Self::Bottom => s
                .decl("bottom", "10px")
                .decl("left", "50%")
                .decl("transform", "translateX(-50%)"),
            Self::BottomRight => s.decl("bottom", "10px").decl("right", "10px"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationPosition {
    Top,
    Middle,
    Bottom,
}

impl NarrationPosition {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or_default() {
            "top" => Self::Top,
            "middle" => Self::Middle,
            _ => Self::Bottom,
        }
    }

    fn style(self) -> Style {
        let base = Style::new()
            .decl("position", "absolute")
            .decl("background-color", "rgba(0, 0, 0, 0.6)")
            .decl("color", "white")
            .decl("font-size", "18px")
            .decl("padding", "20px")
            .decl("z-index", "8888")
            .decl("box-sizing", "border-box")
            .decl("text-align", "center");
        match self {
            Self::Top => base
                .decl("top", "0")
                .decl("left", "0")
                .decl("right", "0")
                .decl("width", "100%"),
            Self::Middle => base
                .decl("top", "50%")
                .decl("left", "50%")
                .decl("transform", "translate(-50%, -50%)")
                .decl("width", "60%")
                .decl("display", "flex")
                .decl("align-items", "center")
                .decl("justify-content", "center")
                .decl("background-color", "rgba(0, 0, 0, 0)")
                .decl("color", "#999"),
            Self::Bottom => base
                .decl("bottom", "0")
                .decl("left", "0")
                .decl("right", "0")
                .decl("width", "100%"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Layer {
    Background,
    Foreground,
}

struct LayerSpec<'a> {
    url: &'a str,
    scale: Option<&'a Scalar>,
    pos: Option<&'a Scalar>,
    visible_width: Option<&'a Scalar>,
}

fn scalar_or(value: Option<&Scalar>, default: f64) -> String {
    match value {
        Some(v) if !v.is_blank() => v.to_string(),
        _ => format_number(default),
    }
}

/// `width`, `left` and a symmetric horizontal crop for one media layer.
fn layer_style(spec: &LayerSpec<'_>) -> Style {
    let visible = spec
        .visible_width
        .filter(|v| !v.is_blank())
        .map_or(DEFAULT_VISIBLE_WIDTH, Scalar::as_f64);
    let crop = format!("{}%", format_number((100.0 - visible) / 2.0));
    Style::new()
        .decl("width", format!("{}%", scalar_or(spec.scale, DEFAULT_SCALE)))
        .decl("left", format!("{}%", scalar_or(spec.pos, DEFAULT_POS)))
        .decl("clip-path", format!("inset(0% {crop} 0% {crop})"))
}

fn media_element(layer: Layer, spec: &LayerSpec<'_>) -> Option<Element> {
    let kind = MediaKind::sniff(spec.url)?;
    let style = layer_style(spec);
    let el = match (layer, kind) {
        (Layer::Background, MediaKind::Video) => Element::new("video")
            .attr("id", "bgVideo")
            .attr("src", spec.url)
            .flag("muted")
            .flag("loop")
            .style(
                &Style::new()
                    .decl("position", "absolute")
                    .decl("bottom", "0")
                    .extend(style),
            ),
        (Layer::Foreground, MediaKind::Video) => Element::new("video")
            .attr("id", "fgVideo")
            .attr("src", spec.url)
            .flag("muted")
            .flag("loop")
            .style(&Style::new().decl("position", "absolute").extend(style)),
        (Layer::Background, MediaKind::Image) => Element::new("img")
            .attr("src", spec.url)
            .attr("alt", "Background Image")
            .attr("class", "bgImg")
            .style(&style),
        (Layer::Foreground, MediaKind::Image) => Element::new("img")
            .attr("src", spec.url)
            .attr("alt", "Foreground Image")
            .attr("class", "fgImg")
            .style(&style),
    };
    Some(el)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn title_element(doc: &PageDocument) -> Option<Element> {
    let title = doc.title.as_deref().unwrap_or_default();
    let show_number = doc.show_page_number.unwrap_or(false);
    if title.is_empty() && !show_number {
        return None;
    }
    let mut text = title.to_owned();
    if show_number {
        text.push('\u{a0}');
        if let Some(num) = &doc.page_num {
            text.push_str(&num.to_string());
        }
    }
    let style = Style::new()
        .decl("position", "absolute")
        .extend(TitlePosition::parse(doc.title_pos.as_deref()).style());
    Some(
        Element::new("div")
            .attr("class", "title")
            .style(&style)
            .text(text),
    )
}

fn animation_button() -> Element {
    let style = Style::new()
        .decl("position", "absolute")
        .decl("top", "4px")
        .decl("right", "4px")
        .decl("z-index", "10001")
        .decl("padding", "10px")
        .decl("background", "rgba(0,0,0,0.7)")
        .decl("color", "white")
        .decl("border", "none")
        .decl("cursor", "pointer");
    Element::new("button")
        .attr("id", "animationPlayButton")
        .attr("onclick", "playPageAnimation()")
        .style(&style)
        .text("Play slideshow")
}

fn conversation_element(
    line: u8,
    text: &str,
    left: Option<&Scalar>,
    top: Option<&Scalar>,
) -> Element {
    let offset = |v: Option<&Scalar>| scalar_or(v, f64::from(DEFAULT_CONV_OFFSET_PX));
    let style = Style::new()
        .decl("position", "absolute")
        .decl("left", format!("{}px", offset(left)))
        .decl("top", format!("{}px", offset(top)));
    Element::new("div")
        .attr("class", "conv")
        .attr("onclick", format!("speakLine({line})"))
        .style(&style)
        .text(text)
}

fn teleport_element(button: &TeleportButton) -> anyhow::Result<Option<Element>> {
    let (Some(name), Some(url), Some(position)) = (
        non_blank(button.name.as_deref()),
        non_blank(button.url.as_deref()),
        non_blank(button.position.as_deref()),
    ) else {
        return Ok(None);
    };

    let white = button.color.as_deref() == Some("white");
    let style = Style::new()
        .decl("position", "absolute")
        .decl("padding", "10px 15px")
        .decl("border", "none")
        .decl("cursor", "pointer")
        .decl("font-size", "24pt")
        .decl("font-weight", "bold")
        .decl("border-radius", "0")
        .decl("z-index", "9999")
        .decl(
            "background-color",
            if white {
                "rgba(255,255,255, 0.6)"
            } else {
                "rgba(0,0,0, 0.6)"
            },
        )
        .decl("color", if white { "black" } else { "white" })
        .extend(ButtonAnchor::parse(position).style());

    let onclick = format!(
        "handleTeleportClick({}, {}, {})",
        serde_json::to_string(url).context("encode teleport url")?,
        button.new_window.unwrap_or(false),
        button.loop_flag.unwrap_or(false),
    );
    Ok(Some(
        Element::new("button")
            .attr("class", "teleportButton")
            .attr("onclick", onclick)
            .style(&style)
            .text(name),
    ))
}

/// Builds the element tree for one page.
pub fn page_document(doc: &PageDocument, options: &RenderOptions) -> anyhow::Result<Document> {
    let scene_color = non_blank(doc.scene_bg_color.as_deref()).unwrap_or(DEFAULT_SCENE_COLOR);
    let scene_style = Style::new().decl("background-color", scene_color);

    let mut out = Document::new("en");
    out.html = out.html.style(&scene_style);

    let page_title = match &doc.page_num {
        Some(num) => format!("Page {num}"),
        None => "Story page".to_owned(),
    };
    out.head = vec![
        Element::new("meta").attr("charset", "UTF-8").into(),
        Element::new("meta")
            .attr("name", "viewport")
            .attr("content", "width=device-width, initial-scale=1.0")
            .into(),
        Element::new("title").text(page_title).into(),
        Element::new("link")
            .attr("rel", "stylesheet")
            .attr("href", options.asset_url("page.css"))
            .into(),
        Element::new("script")
            .attr("id", PAGE_DATA_ELEMENT_ID)
            .attr("type", "application/json")
            .raw_text(script_json(doc).context("serialize page document")?)
            .into(),
    ];
    if doc.has_animation() {
        let slideshow = SlideshowConfig::from_document(doc);
        out.head.push(
            Element::new("script")
                .attr("id", SLIDESHOW_CONFIG_ELEMENT_ID)
                .attr("type", "application/json")
                .raw_text(script_json(&slideshow).context("serialize slideshow config")?)
                .into(),
        );
    }

    let mut body: Vec<Node> = Vec::new();

    let bg_url = doc.bg_url.as_deref().unwrap_or_default();
    let bg = media_element(
        Layer::Background,
        &LayerSpec {
            url: bg_url,
            scale: doc.bg_scale.as_ref(),
            pos: doc.bg_pos.as_ref(),
            visible_width: doc.bg_wid.as_ref(),
        },
    );
    let fg = media_element(
        Layer::Foreground,
        &LayerSpec {
            url: doc.fg_url.as_deref().unwrap_or_default(),
            scale: doc.fg_scale.as_ref(),
            pos: doc.fg_pos.as_ref(),
            visible_width: doc.fg_wid.as_ref(),
        },
    );
    body.extend(bg.into_iter().map(Node::from));
    body.extend(fg.into_iter().map(Node::from));

    let audio_url = non_blank(doc.audio_url.as_deref());
    let has_bg_video = MediaKind::sniff(bg_url) == Some(MediaKind::Video);
    if audio_url.is_some() || has_bg_video {
        body.push(
            Element::new("div")
                .attr("id", "audioIcon")
                .attr("class", "audio-icon play")
                .attr("onclick", "toggleAudioAndVideo()")
                .into(),
        );
    }
    if let Some(audio_url) = audio_url {
        body.push(
            Element::new("audio")
                .attr("id", "audioPlayer")
                .attr("style", "display:none;")
                .child(
                    Element::new("source")
                        .attr("src", audio_url)
                        .attr("type", "audio/mpeg"),
                )
                .into(),
        );
    }

    if options.subtitles {
        if let Some(title) = title_element(doc) {
            body.push(title.into());
        }
        if doc.has_animation() {
            body.push(animation_button().into());
        }
        if let Some(text) = doc.descript.as_deref().filter(|t| !t.is_empty()) {
            let style = NarrationPosition::parse(doc.descript_pos.as_deref()).style();
            body.push(
                Element::new("div")
                    .attr("class", "descript")
                    .style(&style)
                    .text(text)
                    .into(),
            );
        }
        if let Some(text) = non_blank(doc.conv1.as_deref()) {
            body.push(
                conversation_element(1, text, doc.conv1_pos_l.as_ref(), doc.conv1_pos_t.as_ref())
                    .into(),
            );
        }
        if let Some(text) = non_blank(doc.conv2.as_deref()) {
            body.push(
                conversation_element(2, text, doc.conv2_pos_l.as_ref(), doc.conv2_pos_t.as_ref())
                    .into(),
            );
        }
        for button in doc.teleport_buttons.iter().flatten() {
            if let Some(el) = teleport_element(button)? {
                body.push(el.into());
            }
        }
    }

    body.push(
        Element::new("script")
            .attr("src", options.asset_url("page-runtime.js"))
            .into(),
    );

    out.body = Element::new("body").style(&scene_style).children(body);
    Ok(out)
}

pub fn render_page(doc: &PageDocument, options: &RenderOptions) -> anyhow::Result<String> {
    Ok(page_document(doc, options)?.render())
}

/// The player shell: an iframe hosting the current page plus the controls bar.
pub fn render_player(
    settings: &PlayerSettings,
    boot: &PlayerBoot,
    options: &RenderOptions,
) -> anyhow::Result<String> {
    let mut out = Document::new("en");
    let vars = Style::new()
        .decl("--controls-bg", settings.controls_bg_color.as_str())
        .decl("--scene-bg", settings.scene_bg_color.as_str());

    let title = if settings.story_title.trim().is_empty() {
        "Slide Player".to_owned()
    } else {
        settings.story_title.clone()
    };
    out.head = vec![
        Element::new("meta").attr("charset", "UTF-8").into(),
        Element::new("meta")
            .attr("name", "viewport")
            .attr("content", "width=device-width, initial-scale=1.0")
            .into(),
        Element::new("title").text(title).into(),
        Element::new("link")
            .attr("rel", "stylesheet")
            .attr("href", options.asset_url("player.css"))
            .into(),
        Element::new("script")
            .attr("id", PLAYER_CONFIG_ELEMENT_ID)
            .attr("type", "application/json")
            .raw_text(script_json(boot).context("serialize player config")?)
            .into(),
    ];

    let button = |id: &'static str, label: &str| Element::new("button").attr("id", id).text(label);
    let checkbox = |id: &'static str, label: &str| {
        Element::new("label")
            .child(
                Element::new("input")
                    .attr("type", "checkbox")
                    .attr("id", id)
                    .flag("checked"),
            )
            .text(label)
    };

    // The shell starts in the state the session reaches on its first step,
    // so the runtime only has to arm timers.
    let mut frame_src = crate::player::page_file_name(1);
    let mut docked = false;
    for effect in PlayerSession::from_boot(boot).start(boot.initial_page) {
        match effect {
            PlayerEffect::LoadPage { src, .. } => frame_src = src,
            PlayerEffect::HideControls => docked = true,
            PlayerEffect::ShowControls => docked = false,
            _ => {}
        }
    }

    let mut controls = Element::new("div").attr("id", "controls");
    if docked {
        controls = controls.attr("class", "docked");
    }
    let controls = controls
        .child(Element::new("span").text(settings.story_title.as_str()))
        .child(checkbox("autoPageTurn", "Auto advance"))
        .child(checkbox("autoDockMode", "Dock mode"))
        .child(button("calculateTiming", "Recalculate timing"))
        .child(button("previousButton", "\u{2190}"))
        .child(button("nextButton", "\u{2192}"))
        .child(button("homeButton", "Home"))
        .child(
            Element::new("input")
                .attr("type", "number")
                .attr("id", "pageInput")
                .attr("placeholder", "Page")
                .attr("min", "1"),
        )
        .child(button("goButton", "Go"))
        .child(
            Element::new("audio")
                .attr("id", "bgAudio")
                .attr("src", settings.player_bg_audio.as_str())
                .flag("controls")
                .flag("autoplay")
                .flag("loop"),
        )
        .child(
            Element::new("input")
                .attr("type", "range")
                .attr("id", "bgVolume")
                .attr("min", "0")
                .attr("max", "1")
                .attr("step", "0.01")
                .attr("value", "0.5"),
        );

    out.body = Element::new("body")
        .style(&vars)
        .child(
            Element::new("div")
                .attr("id", "container")
                .child(
                    Element::new("iframe")
                        .attr("id", "slideFrame")
                        .attr("src", frame_src),
                )
                .child(controls),
        )
        .child(Element::new("div").attr("class", "dock-trigger"))
        .child(Element::new("script").attr("src", options.asset_url("player-runtime.js")));

    Ok(out.render())
}

/// Reads a page document (or one page of a `pages.json` map) and writes the
/// rendered page.
pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read input: {}", args.input))?;
    let doc = match args.page {
        Some(page) => {
            let mut pages: PageMap = serde_json::from_str(&raw)
                .with_context(|| format!("parse pages map: {}", args.input))?;
            pages
                .remove(&page)
                .ok_or_else(|| anyhow::anyhow!("page {page} not found in {}", args.input))?
        }
        None => serde_json::from_str::<PageDocument>(&raw)
            .with_context(|| format!("parse page document: {}", args.input))?,
    };

    let mut options = match args.asset_version {
        Some(version) => RenderOptions::new(version),
        None => RenderOptions::now(),
    };
    if args.no_subtitles {
        options = options.without_subtitles();
    }
    let html = render_page(&doc, &options)?;

    match &args.out {
        Some(out) => {
            std::fs::write(out, html).with_context(|| format!("write output: {out}"))?;
            tracing::info!(out = %out, "page rendered");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(html.as_bytes())
                .context("write html to stdout")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_doc() -> PageDocument {
        serde_json::from_value(serde_json::json!({
            "bgUrl": "media/1.mp4",
            "bgScale": 80,
            "bgPos": 50,
            "bgWid": 100,
            "titlePos": "top",
            "title": "Intro",
            "showPageNumber": true,
            "pageNum": 1
        }))
        .unwrap()
    }

    #[test]
    fn intro_scenario_renders_video_and_centered_title() -> anyhow::Result<()> {
        let html = render_page(&scenario_doc(), &RenderOptions::new("1"))?;
        assert!(html.contains(r#"<video id="bgVideo" src="media/1.mp4" muted loop"#));
        assert!(html.contains("width:80%; left:50%;"));
        assert!(html.contains("clip-path:inset(0% 0% 0% 0%);"));
        assert!(html.contains(
            r#"<div class="title" style="position:absolute; left:50%; top:10px; transform:translateX(-50%);">Intro&nbsp;1</div>"#
        ));
        // A background video gets the media toggle even without narration audio.
        assert!(html.contains(r#"id="audioIcon""#));
        assert!(!html.contains("audioPlayer"));
        Ok(())
    }

    #[test]
    fn each_layer_gets_exactly_one_element_of_the_sniffed_kind() -> anyhow::Result<()> {
        for (bg, fg, bg_tag, fg_tag) in [
            ("a.jpg", "b.webm", "<img src=\"a.jpg\"", "<video id=\"fgVideo\""),
            ("a.ogg", "b.png", "<video id=\"bgVideo\"", "<img src=\"b.png\""),
            ("a.webp", "b.gif", "<img src=\"a.webp\"", "<img src=\"b.gif\""),
        ] {
            let doc = PageDocument {
                bg_url: Some(bg.into()),
                fg_url: Some(fg.into()),
                ..Default::default()
            };
            let html = render_page(&doc, &RenderOptions::new("1"))?;
            assert_eq!(html.matches(bg_tag).count(), 1, "{bg}");
            assert_eq!(html.matches(fg_tag).count(), 1, "{fg}");
            let count = |needle: &str| html.matches(needle).count();
            assert_eq!(count("class=\"bgImg\"") + count("id=\"bgVideo\""), 1);
            assert_eq!(count("class=\"fgImg\"") + count("id=\"fgVideo\""), 1);
        }
        Ok(())
    }

    #[test]
    fn unknown_extension_is_silently_skipped() -> anyhow::Result<()> {
        let doc = PageDocument {
            bg_url: Some("media/1.JPG".into()),
            fg_url: Some("media/2.bmp".into()),
            ..Default::default()
        };
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(!html.contains("bgImg"));
        assert!(!html.contains("fgImg"));
        assert!(!html.contains("<video"));
        Ok(())
    }

    #[test]
    fn crop_is_split_evenly_and_malformed_values_pass_through() -> anyhow::Result<()> {
        let doc: PageDocument = serde_json::from_value(serde_json::json!({
            "fgUrl": "x.png", "fgScale": "huge", "fgPos": 5, "fgWid": 75
        }))?;
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(html.contains("width:huge%; left:5%; clip-path:inset(0% 12.5% 0% 12.5%);"));

        let doc: PageDocument =
            serde_json::from_value(serde_json::json!({"bgUrl": "x.png", "bgWid": "n/a"}))?;
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(html.contains("inset(0% NaN% 0% NaN%)"));
        Ok(())
    }

    #[test]
    fn missing_title_position_defaults_to_top_left() -> anyhow::Result<()> {
        let doc = PageDocument {
            title: Some("Hi".into()),
            title_pos: Some("sideways".into()),
            ..Default::default()
        };
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(html.contains(r#"style="position:absolute; left:10px; top:10px;">Hi</div>"#));
        Ok(())
    }

    #[test]
    fn title_block_is_omitted_without_title_or_page_number() -> anyhow::Result<()> {
        let doc = PageDocument {
            title: Some(String::new()),
            show_page_number: Some(false),
            ..Default::default()
        };
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(!html.contains("class=\"title\""));
        Ok(())
    }

    #[test]
    fn narration_middle_uses_centered_box() -> anyhow::Result<()> {
        let doc = PageDocument {
            descript: Some("Once upon a time".into()),
            descript_pos: Some("middle".into()),
            ..Default::default()
        };
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(html.contains("transform:translate(-50%, -50%); width:60%;"));

        let doc = PageDocument {
            descript: Some("Banner".into()),
            descript_pos: Some("top".into()),
            ..Default::default()
        };
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(html.contains("top:0; left:0; right:0; width:100%;\">Banner</div>"));
        Ok(())
    }

    #[test]
    fn teleport_button_carries_json_arguments() -> anyhow::Result<()> {
        let doc = PageDocument {
            teleport_buttons: Some(vec![
                TeleportButton {
                    name: Some("Next".into()),
                    url: Some("page3.html".into()),
                    new_window: Some(false),
                    loop_flag: Some(true),
                    position: Some("bottom-right".into()),
                    color: Some("white".into()),
                },
                TeleportButton {
                    name: Some("no position".into()),
                    url: Some("page4.html".into()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert_eq!(html.matches("class=\"teleportButton\"").count(), 1);
        assert!(html.contains(
            r#"onclick="handleTeleportClick(&quot;page3.html&quot;, false, true)""#
        ));
        assert!(html.contains("background-color:rgba(255,255,255, 0.6); color:black;"));
        assert!(html.contains("bottom:10px; right:10px;\">Next</button>"));
        Ok(())
    }

    #[test]
    fn subtitles_off_strips_overlays_but_keeps_media() -> anyhow::Result<()> {
        let mut doc = scenario_doc();
        doc.descript = Some("text".into());
        doc.conv1 = Some("hello".into());
        doc.animation_folder = Some("frames/".into());
        let html = render_page(&doc, &RenderOptions::new("1").without_subtitles())?;
        assert!(html.contains("bgVideo"));
        assert!(!html.contains("class=\"title\""));
        assert!(!html.contains("class=\"descript\""));
        assert!(!html.contains("class=\"conv\""));
        assert!(!html.contains("animationPlayButton"));
        Ok(())
    }

    #[test]
    fn animated_pages_embed_the_normalized_slideshow_config() -> anyhow::Result<()> {
        let mut doc = scenario_doc();
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(!html.contains(SLIDESHOW_CONFIG_ELEMENT_ID));

        doc.animation_folder = Some("media/walk/".into());
        doc.animation_interval = Some(Scalar::from("1.5"));
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(html.contains(
            r#"<script id="slideshowConfig" type="application/json">{"folder":"media/walk/","intervalMs":1500,"#
        ));
        Ok(())
    }

    #[test]
    fn same_document_and_version_render_identically() -> anyhow::Result<()> {
        let doc = scenario_doc();
        let a = render_page(&doc, &RenderOptions::new("1700000000000"))?;
        let b = render_page(&doc, &RenderOptions::new("1700000000000"))?;
        assert_eq!(a, b);
        let c = render_page(&doc, &RenderOptions::new("1700000000001"))?;
        assert_eq!(
            a.replace("1700000000000", "V"),
            c.replace("1700000000001", "V")
        );
        Ok(())
    }

    #[test]
    fn text_content_is_escaped() -> anyhow::Result<()> {
        let doc = PageDocument {
            title: Some("<b>bold</b>".into()),
            ..Default::default()
        };
        let html = render_page(&doc, &RenderOptions::new("1"))?;
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        Ok(())
    }

    #[test]
    fn player_points_iframe_at_initial_page() -> anyhow::Result<()> {
        let boot = PlayerBoot {
            story: "story1".into(),
            initial_page: 4,
            total_pages: 12,
            auto_advance: true,
            default_duration_secs: 10,
            auto_start_delay_ms: 800,
            dock_hide_delay_ms: 500,
            timing: Default::default(),
        };
        let html = render_player(&PlayerSettings::default(), &boot, &RenderOptions::new("1"))?;
        assert!(html.contains(r#"<iframe id="slideFrame" src="page4.html"></iframe>"#));
        assert!(html.contains(r#"<div id="controls" class="docked">"#));
        assert!(html.contains(r#""totalPages":12"#));
        assert!(html.contains(
            r#"<audio id="bgAudio" src="media/music.m4a" controls autoplay loop>"#
        ));
        Ok(())
    }
}
