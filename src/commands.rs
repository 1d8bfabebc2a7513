//! Terminal front end for the room protocol

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::chat::{
    highlight, render_report, snippet, ChatRoom, MessageLog, Notice, RoomOptions, RoomServices,
};
use crate::config::{language_name, Config, Session};
use crate::gateway::HttpGateway;
use crate::models::{AudioClip, Message, Role};
use crate::store::{
    new_room_id, FsMediaStore, FsRoomStore, MemoryMediaStore, MemoryRoomStore, RoomStore,
};

/// Stores under the shared data dir, so every terminal on this machine sees
/// the same rooms.
fn services(config: &Config) -> Result<RoomServices> {
    let data_dir = config.data_dir()?;
    Ok(RoomServices {
        store: Arc::new(FsRoomStore::new(&data_dir, config.poll_interval())),
        media: Arc::new(FsMediaStore::new(data_dir.join("media"))),
        gateway: Arc::new(HttpGateway::new(&config.gateway)?),
    })
}

async fn open_room(
    config: &Config,
    room_id: &str,
) -> Result<(ChatRoom, mpsc::UnboundedReceiver<Notice>)> {
    let (mut room, notices) = ChatRoom::new(
        config.session(),
        services(config)?,
        RoomOptions::from_config(config),
    );
    room.enter(room_id).await?;
    Ok((room, notices))
}

fn print_message(index: usize, msg: &Message) {
    let time = msg.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let kind = if msg.is_audio() { " (audio)" } else { "" };
    println!(
        "#{:<3} [{}] {}{}: {}",
        index, time, msg.sender_role, kind, msg.original_text
    );
    if let Some(ref translated) = msg.translated_text {
        println!("      -> {}", translated);
    }
    if let Some(url) = msg.kind.audio_url() {
        println!("      {}", url);
    }
}

/// Show the session, updating it first if asked.
pub fn session(role: Option<Role>, language: Option<String>) -> Result<()> {
    let mut config = Config::load()?;

    if role.is_some() || language.is_some() {
        if let Some(role) = role {
            config.set_role(role);
        }
        if let Some(ref code) = language {
            config.set_language(code)?;
        }
        config.save()?;
        tracing::info!("Session saved");
    }

    let Session { role, language } = config.session();
    println!("Role:     {}", role);
    println!("Language: {} ({})", language_name(&language), language);
    Ok(())
}

pub async fn new_room(config: &Config) -> Result<()> {
    let room_id = new_room_id();
    open_room(config, &room_id).await?;
    println!("Room created: {}", room_id);
    println!("Share this id with the other participant.");
    Ok(())
}

pub async fn list_rooms(config: &Config, limit: usize) -> Result<()> {
    let store = FsRoomStore::new(config.data_dir()?, config.poll_interval());
    let rooms = store.recent(limit).await?;

    println!("\nRecent Consultations:");
    println!("{:-<60}", "");

    if rooms.is_empty() {
        println!("  (no consultations yet)");
        return Ok(());
    }

    for conv in rooms {
        println!("{}", conv.display_name());
        println!("  ID: {}", conv.id);
        if let Some(last) = conv.last_active {
            println!("  Last: {}", last.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
        }
        println!(
            "  Doctor: {}  Patient: {}",
            conv.doctor_language.as_deref().unwrap_or("-"),
            conv.patient_language.as_deref().unwrap_or("-")
        );
        println!();
    }
    Ok(())
}

pub async fn send_text(config: &Config, room_id: &str, text: &str) -> Result<()> {
    let (room, _notices) = open_room(config, room_id).await?;
    room.send_text(text).await?;
    println!("Message sent.");
    Ok(())
}

pub async fn send_audio(config: &Config, room_id: &str, file: &Path) -> Result<()> {
    let clip = AudioClip::from_file(file)?;
    let (room, _notices) = open_room(config, room_id).await?;
    tracing::info!("Uploading {} ({} bytes)...", file.display(), clip.data.len());
    room.send_audio(clip).await?;
    println!("Audio message sent.");
    Ok(())
}

pub async fn read_messages(config: &Config, room_id: &str, limit: usize) -> Result<()> {
    let (room, _notices) = open_room(config, room_id).await?;
    let mut log = MessageLog::new();
    log.apply_snapshot(room.messages().await?);

    if log.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    let start = log.len() - log.tail(limit).len();
    for (offset, msg) in log.tail(limit).iter().enumerate() {
        print_message(start + offset, msg);
    }
    Ok(())
}

pub async fn search_messages(config: &Config, room_id: &str, query: &str) -> Result<()> {
    let (room, _notices) = open_room(config, room_id).await?;
    let mut log = MessageLog::new();
    log.apply_snapshot(room.messages().await?);

    let hits = log.search(query);
    if hits.is_empty() {
        println!("No messages match \"{}\".", query);
        return Ok(());
    }

    println!("{} match(es) for \"{}\":", hits.len(), query);
    for hit in hits {
        let msg = hit.message;
        println!(
            "#{:<3} {}: {}",
            hit.index,
            msg.sender_role,
            highlight(&snippet(&msg.original_text, 80), query, "[", "]")
        );
        if let Some(ref translated) = msg.translated_text {
            println!("      -> {}", highlight(&snippet(translated, 80), query, "[", "]"));
        }
    }
    Ok(())
}

pub async fn summary(config: &Config, room_id: &str) -> Result<()> {
    let (room, _notices) = open_room(config, room_id).await?;
    tracing::info!("Generating summary...");
    let summary = room.summarize().await?;
    if summary.is_unavailable() {
        tracing::warn!("Summary service unavailable");
    }
    println!("{}", render_report(&summary, Local::now().date_naive()));
    Ok(())
}

async fn handle_input(room: &ChatRoom, log: &MessageLog, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    // Failures are reported on the notice channel.
    if let Some(path) = line.strip_prefix("/audio ") {
        match AudioClip::from_file(Path::new(path.trim())) {
            Ok(clip) => {
                let _ = room.send_audio(clip).await;
            }
            Err(e) => eprintln!("{:#}", e),
        }
    } else if let Some(query) = line.strip_prefix("/search ") {
        for hit in log.search(query) {
            println!(
                "  #{} {}",
                hit.index,
                highlight(&snippet(&hit.message.original_text, 80), query, "[", "]")
            );
        }
    } else {
        let _ = room.send_text(line).await;
    }
}

/// Follow a room until Ctrl-C. With `interactive`, stdin lines are sent as
/// messages (`/audio <file>` sends a recording, `/search <query>` searches).
pub async fn watch(config: &Config, room_id: &str, interactive: bool) -> Result<()> {
    let (room, mut notices) = open_room(config, room_id).await?;
    let mut languages = room.language_changes().context("Room is not open")?;
    let mut feed = room.subscribe_messages().await?;
    let mut log = MessageLog::new();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let session = room.session();
    println!(
        "Room {} as {} ({}). Translating into {}. Ctrl-C to stop.",
        room_id,
        session.role,
        language_name(&session.language),
        language_name(&room.target_language().unwrap_or_default())
    );

    // Indicator for outstanding sends while stdin is being handled.
    let indicator = interactive.then(|| {
        let mut sending = room.sending();
        tokio::spawn(async move {
            while sending.changed().await.is_ok() {
                if *sending.borrow_and_update() {
                    eprintln!("Sending...");
                }
            }
        })
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            snapshot = feed.recv() => {
                let Some(snapshot) = snapshot else { break };
                let fresh = log.apply_snapshot(snapshot);
                let start = log.len() - fresh;
                for (offset, msg) in log.tail(fresh).iter().enumerate() {
                    print_message(start + offset, msg);
                }
            }
            changed = languages.changed() => {
                if changed.is_err() {
                    break;
                }
                let code = languages.borrow_and_update().clone();
                println!("-- Other participant speaks {}", language_name(&code));
            }
            Some(notice) = notices.recv() => {
                eprintln!("!! {}", notice);
            }
            line = input.next_line(), if interactive => {
                match line? {
                    Some(line) => handle_input(&room, &log, &line).await,
                    None => break,
                }
            }
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    if let Some(task) = indicator {
        task.abort();
    }
    Ok(())
}

const DEMO_SCRIPT: &[(Role, &str)] = &[
    (Role::Doctor, "Hello, what brings you in today?"),
    (Role::Patient, "Tengo dolor de cabeza desde hace tres días."),
    (Role::Doctor, "Are you taking any medication for it?"),
    (Role::Patient, "Solo ibuprofeno, dos veces al día."),
    (Role::Doctor, "Please rest, drink water and come back if it gets worse."),
];

/// Two in-process participants (English doctor, Spanish patient) exchanging
/// a short consultation through the configured gateway.
pub async fn demo(config: &Config) -> Result<()> {
    let services = RoomServices {
        store: Arc::new(MemoryRoomStore::new()),
        media: Arc::new(MemoryMediaStore::new()),
        gateway: Arc::new(HttpGateway::new(&config.gateway)?),
    };
    let options = RoomOptions::from_config(config);
    let room_id = new_room_id();

    let (mut doctor, _doctor_notices) = ChatRoom::new(
        Session {
            role: Role::Doctor,
            language: "en".to_string(),
        },
        services.clone(),
        options.clone(),
    );
    let (mut patient, _patient_notices) = ChatRoom::new(
        Session {
            role: Role::Patient,
            language: "es".to_string(),
        },
        services.clone(),
        options,
    );

    doctor.enter(&room_id).await?;
    patient.enter(&room_id).await?;

    // The doctor joined first; wait for the patient's language to reach them.
    if let Some(mut changes) = doctor.language_changes() {
        let _ = tokio::time::timeout(Duration::from_secs(1), changes.wait_for(|l| l == "es")).await;
    }

    for (role, text) in DEMO_SCRIPT {
        let speaker = match role {
            Role::Doctor => &doctor,
            Role::Patient => &patient,
        };
        speaker.send_text(text).await?;
    }

    let mut log = MessageLog::new();
    log.apply_snapshot(services.store.messages(&room_id).await?);
    for (index, msg) in log.messages().iter().enumerate() {
        print_message(index, msg);
    }

    println!();
    let summary = doctor.summarize().await?;
    println!("{}", render_report(&summary, Local::now().date_naive()));
    Ok(())
}
