//! phono interactive CLI front-end
//!
//! Thin consumer of the player facade: resolves command-line inputs into
//! tracks, then reads transport commands from stdin until `quit` or EOF.

use anyhow::Context;
use clap::Parser;
use phono::pcm::format_elapsed;
use phono::resolver::{
    LocalFileResolver, RemoteUrlResolver, RequestCache, RoutingResolver, TrackResolver,
    resolve_single,
};
use phono::sink::FfplaySink;
use phono::source::{AudioSource, FfmpegSource, RemoteMediaSource, RoutingAudioSource};
use phono::{
    PlaybackEndReason, PlaybackEndResult, Player, PlayerConfig, PlayerHooks, RepeatMode, Track,
    TrackKind, TrackRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// phono - queue-driven audio player over an external transcoder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files, directories, or URLs to enqueue at startup
    tracks: Vec<String>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start with shuffle enabled
    #[arg(long)]
    shuffle: bool,

    /// Initial repeat mode: off|one|track|all
    #[arg(long, value_name = "MODE")]
    repeat: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Hooks printing playback progress to the terminal
struct CliHooks;

impl PlayerHooks for CliHooks {
    fn on_track_changed(&self, track: Option<&Track>) {
        match track {
            Some(track) => println!("now playing: {} ({})", track.title, track.uri),
            None => println!("queue drained"),
        }
    }

    fn on_session_ended(&self, track: &Track, result: &PlaybackEndResult) {
        match result.reason {
            PlaybackEndReason::Completed => {}
            PlaybackEndReason::Cancelled => println!("cancelled: {}", track.title),
            PlaybackEndReason::Failed => println!(
                "failed: {} ({})",
                track.title,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    fn on_loop_faulted(&self, error: &phono::Error) {
        eprintln!("player loop faulted: {error}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("phono={log_level}").into()),
        )
        .init();

    let config = PlayerConfig::load(args.config.as_deref()).context("loading configuration")?;

    // Resolver order is policy: remote first, so URLs are never read as paths.
    let cache = Arc::new(RequestCache::new());
    let mut remote_resolver = RemoteUrlResolver::new(&config.ytdlp_bin);
    if let Some(ttl) = config.resolver_cache_ttl() {
        remote_resolver = remote_resolver.with_cache(Arc::clone(&cache), ttl);
    }
    let resolver = Arc::new(RoutingResolver::new(vec![
        Arc::new(remote_resolver),
        Arc::new(LocalFileResolver::new()),
    ]));

    let local_source = Arc::new(FfmpegSource::new(&config.ffmpeg_bin, config.child_grace()));
    let remote_source = Arc::new(RemoteMediaSource::new(
        &config.ytdlp_bin,
        &config.ffmpeg_bin,
        config.child_grace(),
    ));
    let source = Arc::new(
        RoutingAudioSource::new()
            .route(TrackKind::LocalFile, local_source)
            .route(TrackKind::Remote, remote_source),
    );
    let sink = Arc::new(FfplaySink::new(
        &config.ffplay_bin,
        config.volume,
        config.child_grace(),
    ));

    let player = Player::with_hooks(
        config.clone(),
        Arc::clone(&source) as Arc<dyn AudioSource>,
        Arc::clone(&sink) as Arc<dyn phono::sink::AudioSink>,
        Arc::new(CliHooks),
    );
    player.set_shuffle(args.shuffle);
    if let Some(repeat) = &args.repeat {
        let mode: RepeatMode = repeat
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("parsing --repeat")?;
        player.set_repeat_mode(mode);
    }
    player.start();

    let cancel = CancellationToken::new();
    for input in &args.tracks {
        match resolver.resolve(&TrackRequest::new(input), &cancel).await {
            Ok(tracks) if tracks.is_empty() => warn!("{input}: nothing to play"),
            Ok(tracks) => player.enqueue(tracks).await?,
            Err(e) => warn!("{input}: {e}"),
        }
    }

    info!("ready; type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        match command {
            "play" if rest.is_empty() => {
                player.resume().await?;
            }
            "play" => match resolver.resolve(&TrackRequest::new(rest), &cancel).await {
                Ok(tracks) if tracks.is_empty() => println!("{rest}: nothing to play"),
                Ok(tracks) => player.enqueue(tracks).await?,
                Err(e) => println!("{e}"),
            },
            "now" => {
                match resolve_single(resolver.as_ref(), &TrackRequest::new(rest), &cancel).await {
                    Ok(Some(track)) => player.play_now(track).await?,
                    Ok(None) => println!("{rest}: nothing to play"),
                    Err(e) => println!("{e}"),
                }
            }
            "pause" => player.pause().await?,
            "resume" => player.resume().await?,
            "skip" => player.skip().await?,
            "stop" => player.stop().await,
            "clear" => player.clear().await?,
            "queue" => {
                let queue = player.queue_snapshot();
                if queue.is_empty() {
                    println!("queue is empty");
                }
                for (index, track) in queue.iter().enumerate() {
                    println!("{:3}. {} ({})", index + 1, track.title, track.uri);
                }
            }
            "shuffle" => match parse_shuffle(player.shuffle(), rest) {
                Ok(shuffle) => {
                    player.set_shuffle(shuffle);
                    println!("shuffle {}", if shuffle { "on" } else { "off" });
                }
                Err(e) => println!("{e}"),
            },
            "repeat" => match rest.parse::<RepeatMode>() {
                Ok(mode) => {
                    player.set_repeat_mode(mode);
                    println!("repeat {mode}");
                }
                Err(e) => println!("{e}"),
            },
            "status" => print_status(&player),
            "help" => print_help(),
            "quit" | "exit" => break,
            other => println!("unknown command: {other} (try 'help')"),
        }
    }

    info!("shutting down");
    player.dispose().await;
    if let Err(e) = source.shutdown().await {
        warn!("source shutdown failed: {e}");
    }
    Ok(())
}

/// Parse a shuffle switch: `on|off|toggle`
fn parse_shuffle(current: bool, arg: &str) -> Result<bool, String> {
    match arg {
        "on" => Ok(true),
        "off" => Ok(false),
        "toggle" => Ok(!current),
        other => Err(format!("unknown shuffle switch: {other}")),
    }
}

fn print_status(player: &Player) {
    println!(
        "state: {}  repeat: {}  shuffle: {}",
        player.state(),
        player.repeat_mode(),
        if player.shuffle() { "on" } else { "off" }
    );
    if let Some(session) = player.current_session() {
        println!(
            "track: {} ({})  started: {}  elapsed: {}",
            session.track.title,
            session.track.uri,
            session.started_at_utc.format("%H:%M:%S"),
            format_elapsed(session.elapsed())
        );
    }
}

fn print_help() {
    println!(
        "commands:\n  \
         play [input]     resume, or resolve+enqueue an input\n  \
         now <input>      resolve and play immediately\n  \
         pause            pause playback\n  \
         resume           resume playback\n  \
         skip             skip the current track\n  \
         stop             stop and clear the queue\n  \
         clear            clear the pending queue\n  \
         queue            show pending tracks\n  \
         shuffle <s>      on|off|toggle\n  \
         repeat <m>       off|one|track|all\n  \
         status           show player status\n  \
         quit             exit"
    );
}
