use std::sync::Arc;

use quizhub::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

struct Settings {
    port: String,
    db_path: String,
    questions_path: String,
}

impl Settings {
    fn from_env() -> Self {
        Self {
            port: env_or("PORT", "8080"),
            db_path: env_or("DB_PATH", "mock/db.json"),
            questions_path: env_or("QUESTIONS_PATH", "mock/questions.json"),
        }
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

// ---------------------------------------------------------------------------
// Admin console
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Start(RoomId),
    End(RoomId),
    Status(RoomId),
    Rooms,
    Help,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| "empty command".to_string())?;
    let room = words.next().map(RoomId::from);
    if words.next().is_some() {
        return Err(format!("too many arguments to {verb:?}"));
    }
    match (verb, room) {
        ("start", Some(room)) => Ok(Command::Start(room)),
        ("end", Some(room)) => Ok(Command::End(room)),
        ("status", Some(room)) => Ok(Command::Status(room)),
        ("rooms", None) => Ok(Command::Rooms),
        ("help", None) => Ok(Command::Help),
        ("start" | "end" | "status", None) => Err(format!("usage: {verb} <roomId>")),
        _ => Err(format!("unknown command {line:?}, try `help`")),
    }
}

async fn execute(engine: &GameEngine, hub: &HubHandle, command: Command) -> String {
    match command {
        Command::Start(room) => match engine.start_game(room.clone()).await {
            Ok(players) => format!("started {room} with {players} players"),
            Err(e) => format!("could not start {room}: {e}"),
        },
        Command::End(room) => {
            if engine.end_game(&room).await {
                format!("ended {room}")
            } else {
                format!("no game in {room}")
            }
        }
        Command::Status(room) => {
            let members = hub.members(&room).await;
            match engine.snapshot(&room).await {
                Some(game) => format!(
                    "{room}: {} connected, question {} ({}), scores {:?}",
                    members.len(),
                    game.question_number,
                    if game.question_active { "open" } else { "closed" },
                    game.scores
                ),
                None => format!("{room}: {} connected, no game", members.len()),
            }
        }
        Command::Rooms => {
            let rooms = hub.room_ids().await;
            if rooms.is_empty() {
                "no rooms".to_string()
            } else {
                rooms.iter().map(RoomId::as_str).collect::<Vec<_>>().join(" ")
            }
        }
        Command::Help => "commands: start <roomId> | end <roomId> | status <roomId> | rooms".to_string(),
    }
}

async fn admin_console(engine: GameEngine, hub: HubHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                let reply = match parse_command(&line) {
                    Ok(command) => execute(&engine, &hub, command).await,
                    Err(e) => e,
                };
                println!("{reply}");
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    let addr = format!("0.0.0.0:{}", settings.port);
    tracing::info!(
        %addr,
        db_path = %settings.db_path,
        questions_path = %settings.questions_path,
        "starting quiz server"
    );

    let bank = QuestionBank::load(&settings.questions_path).await?;
    let store = Arc::new(JsonFileStore::open(&settings.db_path).await?);

    let server = QuizServer::builder()
        .bind(&addr)
        .questions(bank)
        .store(store)
        .build()
        .await?;

    tokio::spawn(admin_console(server.engine(), server.hub()));
    eprintln!("type `help` for admin commands");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("start r1"), Ok(Command::Start(RoomId::from("r1"))));
        assert_eq!(parse_command("  end   r1 "), Ok(Command::End(RoomId::from("r1"))));
        assert_eq!(parse_command("status r1"), Ok(Command::Status(RoomId::from("r1"))));
        assert_eq!(parse_command("rooms"), Ok(Command::Rooms));
        assert_eq!(parse_command("help"), Ok(Command::Help));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("start").unwrap_err().contains("usage"));
        assert!(parse_command("start a b").is_err());
        assert!(parse_command("rooms now").is_err());
        assert!(parse_command("launch r1").is_err());
    }

    #[test]
    fn test_bundled_files_parse() {
        let questions = include_bytes!("../mock/questions.json");
        let bank = QuestionBank::from_json(questions).unwrap();
        assert!(bank.len() >= 10);
        for q in bank.iter() {
            assert!(q.choices.contains(&q.answer), "{} lists its answer", q.id);
        }
    }

    #[tokio::test]
    async fn test_start_command_opens_a_question() {
        let bank = QuestionBank::from_json(include_bytes!("../mock/questions.json")).unwrap();
        let server = QuizServer::builder()
            .bind("127.0.0.1:0")
            .questions(bank)
            .build()
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (engine, hub) = (server.engine(), server.hub());
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/demo?userId=alice"))
            .await
            .unwrap();
        let _ = ws.next().await.unwrap().unwrap(); // user_joined

        let reply = execute(&engine, &hub, Command::Start(RoomId::from("demo"))).await;
        assert_eq!(reply, "started demo with 1 players");

        let msg = ws.next().await.unwrap().unwrap();
        let value: serde_json::Value = match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text, got {other:?}"),
        };
        assert_eq!(value["type"], "question_start");

        let status = execute(&engine, &hub, Command::Status(RoomId::from("demo"))).await;
        assert!(status.starts_with("demo: 1 connected, question 1 (open)"), "{status}");
        assert_eq!(execute(&engine, &hub, Command::Rooms).await, "demo");
    }
}
