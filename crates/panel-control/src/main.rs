use std::path::PathBuf;

use clap::Parser;
use panel_control::terminal::TerminalHost;
use panel_control::{ControlEvent, Controller, FileStore, TabId, VkApi};
use panel_player::mpv::{MpvDriver, MpvOutput};
use panel_player::{
    MemoryOutput, OutputEvent, OutputHandle, PresentationCore, PresentationEvent, Section,
    ViewSnapshot,
};
use panel_proto::config::Config;
use panel_proto::ChannelBridge;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Toolbar music player: a playlist panel and prev/play/next buttons, driven
/// from the terminal.
#[derive(Parser)]
#[command(name = "panelplay", version)]
struct Args {
    /// Record playback commands instead of starting mpv.
    #[arg(long)]
    headless: bool,

    /// Read configuration from this file instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// One line typed on stdin.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Control(ControlEvent),
    Presentation(Activation),
    TogglePanel,
    HidePanel,
    Tab(String),
    Help,
    Quit,
}

/// Presentation-side inputs reachable from the terminal.
#[derive(Debug, PartialEq, Eq)]
enum Activation {
    Row(usize),
    Login,
    Logout,
}

const HELP: &str = "\
commands:
  prev | play | next     toolbar buttons
  panel                  toggle the playlist panel
  hide                   close the panel
  click <n>              click playlist row n
  login | logout         panel buttons
  tab <url>              report a loaded browser tab
  help | quit";

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let cmd = match word {
        "prev" => Command::Control(ControlEvent::PrevClicked),
        "play" => Command::Control(ControlEvent::PlayClicked),
        "next" => Command::Control(ControlEvent::NextClicked),
        "panel" => Command::TogglePanel,
        "hide" => Command::HidePanel,
        "click" => Command::Presentation(Activation::Row(rest.parse().ok()?)),
        "login" => Command::Presentation(Activation::Login),
        "logout" => Command::Presentation(Activation::Logout),
        "tab" if !rest.is_empty() => Command::Tab(rest.to_string()),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(cmd)
}

fn render_snapshot(snapshot: &ViewSnapshot) -> String {
    match &snapshot.section {
        Section::Login => "── login ──  type `login` to authorize".to_string(),
        Section::EmptyPlaylist => "── playlist is empty ──".to_string(),
        Section::ApiError(message) => format!("── error ──  {message}"),
        Section::Playlist => {
            let mut out = String::from("── playlist ──");
            for item in &snapshot.items {
                let marker = if snapshot.active == Some(item.position) {
                    "▶"
                } else {
                    " "
                };
                out.push_str(&format!("\n{marker} {:>3}  {}", item.position, item.markup));
            }
            out
        }
    }
}

/// Print the panel whenever what it shows changes.
async fn print_view(mut rx: watch::Receiver<ViewSnapshot>) {
    let mut shown: Option<ViewSnapshot> = None;
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        let same = shown.as_ref().is_some_and(|prev| {
            prev.section == snapshot.section
                && prev.items == snapshot.items
                && prev.active == snapshot.active
        });
        if !same {
            println!("{}", render_snapshot(&snapshot));
            shown = Some(snapshot);
        }
    }
}

async fn start_mpv(
    events: mpsc::Sender<PresentationEvent>,
) -> anyhow::Result<(MpvDriver, MpvOutput)> {
    let mut driver = MpvDriver::new();
    let (mpv_tx, mpv_rx) = mpsc::channel(256);
    let handle = driver.spawn_and_connect(mpv_tx).await?;

    let (output_tx, mut output_rx) = mpsc::channel::<OutputEvent>(64);
    let output = MpvOutput::new(handle, mpv_rx, output_tx);
    tokio::spawn(async move {
        while let Some(evt) = output_rx.recv().await {
            if events.send(PresentationEvent::Output(evt)).await.is_err() {
                break;
            }
        }
    });
    Ok((driver, output))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_toml_str(&std::fs::read_to_string(path)?),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = panel_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("panelplay.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; default to debug for the two contexts only.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,panel_player=debug,panel_control=debug".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("panelplay log: {}", log_path.display());
    info!("panelplay starting…");

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            warn!("config: {}, using defaults", e);
            Config::default()
        }
    };

    // ── Bridge between the two contexts ──────────────────────────────────────
    let (control_port, presentation_port) = ChannelBridge::in_process();

    // ── Presentation context ─────────────────────────────────────────────────
    let (presentation_tx, presentation_rx) = mpsc::channel::<PresentationEvent>(256);

    let mut driver = None;
    let output: Box<dyn OutputHandle> = if args.headless {
        Box::new(MemoryOutput::new())
    } else {
        match start_mpv(presentation_tx.clone()).await {
            Ok((mpv, output)) => {
                driver = Some(mpv);
                Box::new(output)
            }
            Err(e) => {
                warn!("mpv unavailable: {}", e);
                eprintln!("mpv unavailable ({e}), running without audio");
                Box::new(MemoryOutput::new())
            }
        }
    };

    let core = PresentationCore::new(output, presentation_port, config.player.item_template.clone());
    tokio::spawn(print_view(core.subscribe_view()));
    let presentation = tokio::spawn(async move {
        if let Err(e) = core.run(presentation_rx).await {
            tracing::error!("PresentationCore exited with error: {}", e);
        }
    });

    // ── Control context ──────────────────────────────────────────────────────
    let (control_tx, control_rx) = mpsc::channel::<ControlEvent>(64);
    let store = FileStore::open(&config.paths.store_file);
    info!("store: {}", store.path().display());
    let controller = Controller::new(
        VkApi::new(&config.api),
        store,
        TerminalHost::stdout(),
        control_port,
        &config,
    );
    let control = tokio::spawn(async move {
        if let Err(e) = controller.run(control_rx).await {
            tracing::error!("Controller exited with error: {}", e);
        }
    });

    // ── Terminal input ───────────────────────────────────────────────────────
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut panel_checked = false;
    let mut next_tab: TabId = 1;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(cmd) = parse_command(&line) else {
            println!("unknown command: {}", line.trim());
            continue;
        };
        let delivered = match cmd {
            Command::Control(evt) => control_tx.send(evt).await.is_ok(),
            Command::TogglePanel => {
                panel_checked = !panel_checked;
                let evt = if panel_checked {
                    ControlEvent::PanelToggled(true)
                } else {
                    ControlEvent::PanelHidden
                };
                control_tx.send(evt).await.is_ok()
            }
            Command::HidePanel => {
                panel_checked = false;
                control_tx.send(ControlEvent::PanelHidden).await.is_ok()
            }
            Command::Tab(url) => {
                let tab = next_tab;
                next_tab += 1;
                control_tx.send(ControlEvent::TabReady { tab, url }).await.is_ok()
            }
            Command::Presentation(activation) => {
                let evt = match activation {
                    Activation::Row(n) => PresentationEvent::ItemActivated(n),
                    Activation::Login => PresentationEvent::LoginClicked,
                    Activation::Logout => PresentationEvent::LogoutClicked,
                };
                presentation_tx.send(evt).await.is_ok()
            }
            Command::Help => {
                println!("{HELP}");
                true
            }
            Command::Quit => break,
        };
        if !delivered {
            warn!("input dropped: context already stopped");
            break;
        }
    }

    info!("panelplay shutting down");
    let _ = control_tx.send(ControlEvent::Shutdown).await;
    let _ = presentation_tx.send(PresentationEvent::Shutdown).await;
    let _ = control.await;
    let _ = presentation.await;
    if let Some(mut mpv) = driver {
        mpv.kill().await;
    }
    Ok(())
}
