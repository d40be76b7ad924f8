use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use alexa_voice::config::LoadOptions;
use alexa_voice::voice::{Microphone, UtteranceDetector, rms_level};
use alexa_voice::{
    AudioBuffer, ChatTurn, Config, Conversation, ConversationEvent, ConversationPorts, CpalOutput,
    GeminiClient, JsonFileStore, ListenOutcome, MicrophoneRecognizer, PlaybackScheduler,
    Rejection, Role, SpeechCapturePort, SpeechSynthesizer, SubmitOutcome,
};

/// Alexa - voice-enabled chat assistant
#[derive(Parser)]
#[command(name = "alexa", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Start with spoken replies turned off
    #[arg(long, env = "ALEXA_NO_TTS")]
    no_tts: bool,

    /// Disable microphone input (for machines without audio input)
    #[arg(long, env = "ALEXA_DISABLE_VOICE")]
    disable_voice: bool,

    /// Directory for the stored user and chat history
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Speak a phrase through the synthesis and playback pipeline
    Say {
        /// Text to speak
        #[arg(default_value = "Привет! Я Алекса. Проверка синтеза речи.")]
        text: String,
    },
    /// Play a chime through the speech playback path
    TestSpeaker,
    /// Show microphone level and utterance detection
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; chat output owns stdout
    let filter = match cli.verbose {
        0 => "warn",
        1 => "warn,alexa=info,alexa_voice=info",
        2 => "info,alexa=debug,alexa_voice=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let options = LoadOptions {
        disable_voice: cli.disable_voice,
        no_tts: cli.no_tts,
        data_dir: cli.data_dir,
    };

    match cli.command {
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::Say { text }) => say(&Config::load_with_options(&options), &text).await,
        None => chat(Config::load_with_options(&options)).await,
    }
}

fn gemini_client(config: &Config) -> anyhow::Result<Arc<GeminiClient>> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        anyhow::anyhow!("no API key: set GEMINI_API_KEY or api_key in ~/.config/alexa/config.toml")
    })?;
    Ok(Arc::new(GeminiClient::new(api_key, &config.gemini)?))
}

/// Interactive chat session
async fn chat(config: Config) -> anyhow::Result<()> {
    let gemini = gemini_client(&config)?;

    let capture: Option<Arc<dyn SpeechCapturePort>> = if config.voice.enabled {
        Some(Arc::new(MicrophoneRecognizer::new(
            gemini.clone(),
            config.voice.locale.clone(),
            Duration::from_secs(config.voice.listen_secs),
        )))
    } else {
        None
    };

    let store = Arc::new(JsonFileStore::new(&config.data_dir)?);
    tracing::info!(data_dir = %config.data_dir.display(), "using session store");

    let conversation = Arc::new(Conversation::new(
        config.conversation.clone(),
        ConversationPorts {
            chat: gemini.clone(),
            speech: gemini,
            output: Arc::new(CpalOutput::new()),
            capture,
            store,
        },
    )?);

    let printer = tokio::spawn(print_events(conversation.subscribe()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    'session: loop {
        if conversation.user().is_none() && !login(&conversation, &mut lines).await? {
            break;
        }

        if let Some(user) = conversation.user() {
            println!("\nАлекса • {user}");
        }
        print_history(&conversation.turns());
        print_help(&conversation);

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            match line {
                "" => {}
                "/quit" | "/exit" => break 'session,
                "/help" => print_help(&conversation),
                "/history" => print_history(&conversation.turns()),
                "/tts" => {
                    let enabled = !conversation.tts_enabled();
                    conversation.set_tts_enabled(enabled);
                    println!("(озвучка {})", if enabled { "включена" } else { "выключена" });
                }
                "/listen" => toggle_listening(&conversation),
                "/logout" => {
                    conversation.logout().await?;
                    print_history(&conversation.turns());
                    continue 'session;
                }
                text => match conversation.submit(text).await? {
                    SubmitOutcome::Rejected(Rejection::Busy) => {
                        println!("(подождите, Алекса ещё отвечает)");
                    }
                    SubmitOutcome::Replied(_)
                    | SubmitOutcome::Failed(_)
                    | SubmitOutcome::Discarded
                    | SubmitOutcome::Rejected(Rejection::Empty) => {}
                },
            }
        }

        break;
    }

    printer.abort();
    Ok(())
}

/// Ask for a name until one is given; returns false on end of input
async fn login(
    conversation: &Conversation,
    lines: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<bool> {
    println!("Добро пожаловать! Как вас зовут?");
    while let Some(line) = lines.next_line().await? {
        if conversation.login(&line).await? {
            return Ok(true);
        }
        println!("Введите имя, чтобы продолжить.");
    }
    Ok(false)
}

/// Start a listening session in the background, or stop the active one
fn toggle_listening(conversation: &Arc<Conversation>) {
    if !conversation.can_listen() {
        println!("(голосовой ввод недоступен)");
        return;
    }

    if conversation.status().listening {
        conversation.stop_listening();
        return;
    }

    let conversation = Arc::clone(conversation);
    tokio::spawn(async move {
        match conversation.listen().await {
            Ok(ListenOutcome::NothingHeard) => println!("(ничего не услышала)"),
            Ok(ListenOutcome::Busy) => println!("(подождите, Алекса ещё отвечает)"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "listening failed"),
        }
    });
}

/// Render conversation events as they happen
async fn print_events(mut events: tokio::sync::broadcast::Receiver<ConversationEvent>) {
    loop {
        match events.recv().await {
            Ok(ConversationEvent::TurnAppended(turn)) => print_turn(&turn),
            Ok(ConversationEvent::Loading(true)) => println!("…"),
            Ok(ConversationEvent::Speaking(true)) => println!("(говорит)"),
            Ok(ConversationEvent::Listening(true)) => {
                println!("(слушаю, /listen ещё раз, чтобы остановить)");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_turn(turn: &ChatTurn) {
    let time = turn.timestamp.with_timezone(&chrono::Local).format("%H:%M");
    match turn.role {
        Role::User => println!("[{time}] Вы: {}", turn.text),
        Role::Assistant => {
            println!("[{time}] Алекса: {}", turn.text);
            for (i, source) in turn.sources.iter().enumerate() {
                println!("    [{}] {} ({})", i + 1, source.title, source.uri);
            }
        }
    }
}

fn print_history(turns: &[ChatTurn]) {
    for turn in turns {
        print_turn(turn);
    }
}

fn print_help(conversation: &Conversation) {
    println!(
        "Команды: /listen (голос), /tts (озвучка: {}), /history, /logout, /quit",
        if conversation.tts_enabled() { "вкл" } else { "выкл" }
    );
}

/// Synthesize one phrase and play it
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let gemini = gemini_client(config)?;
    let scheduler = PlaybackScheduler::new(Arc::new(CpalOutput::new()));

    println!("Synthesizing: {text}");
    let Some(audio) = gemini.synthesize(text).await? else {
        println!("The service returned no audio.");
        return Ok(());
    };

    scheduler.play_base64(&audio).await?;
    println!("Done.");
    Ok(())
}

/// Play a short two-note chime through the speech playback path
async fn test_speaker() -> anyhow::Result<()> {
    let sample_rate = alexa_voice::audio::SPEECH_SAMPLE_RATE;
    let note_len = usize::try_from(sample_rate / 2)?;

    #[allow(clippy::cast_precision_loss)]
    let chime: Vec<f32> = [523.25_f32, 659.25]
        .iter()
        .flat_map(|&freq| {
            (0..note_len).map(move |i| {
                let t = i as f32 / sample_rate as f32;
                let fade = 1.0 - i as f32 / note_len as f32;
                (std::f32::consts::TAU * freq * t).sin() * 0.25 * fade
            })
        })
        .collect();

    let buffer = AudioBuffer::mono(chime, sample_rate);
    println!(
        "Проигрываю сигнал ({} мс, {sample_rate} Гц)...",
        buffer.duration().as_millis()
    );

    PlaybackScheduler::new(Arc::new(CpalOutput::new()))
        .play(buffer)
        .await?;

    println!("Готово. Если сигнала не было слышно, проверьте устройство вывода по умолчанию.");
    Ok(())
}

/// Show microphone level and whether an utterance would be detected
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    const BAR_WIDTH: usize = 40;

    println!("Слушаю микрофон {duration} с. Скажите что-нибудь.");

    let recording = Microphone::open()?.record()?;
    let mut detector = UtteranceDetector::new();

    for second in 1..=duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let block = recording.drain();
        let level = rms_level(&block);
        detector.process(&block);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let filled = ((level * 200.0) as usize).min(BAR_WIDTH);
        println!(
            "{second:>3} с  {bar:<width$}  {level:.3}  {state:?}",
            bar = "#".repeat(filled),
            width = BAR_WIDTH,
            state = detector.state(),
        );
    }

    let leftover = recording.finish();
    tracing::debug!(samples = leftover.len(), "mic test finished");

    if detector.heard_speech() {
        println!("Речь обнаружена, голосовой ввод должен работать.");
    } else {
        println!("Речь не обнаружена. Проверьте устройство ввода по умолчанию и уровень записи.");
    }
    Ok(())
}
