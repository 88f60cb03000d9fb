// Terminal front end for a chat session: same core as the web UI,
// driven from stdin.

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use auraassist::profile::ProfileForm;
use auraassist::prompt::{PromptTemplate, Role};
use auraassist::speech::Playback;
use auraassist::{ChatConfig, ChatError, ChatSession};

type Input = Lines<BufReader<Stdin>>;

async fn ask(input: &mut Input, label: &str) -> Result<String> {
    print!("{label}: ");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.unwrap_or_default().trim().to_string())
}

async fn read_profile(input: &mut Input) -> Result<ProfileForm> {
    println!("Personalize your experience");
    let api_key = match std::env::var("GROQ_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => ask(input, "Groq API key").await?,
    };
    let name = ask(input, "Full name").await?;
    let age = loop {
        let raw = ask(input, "Age").await?;
        if raw.is_empty() {
            break None;
        }
        match raw.parse::<u8>() {
            Ok(age) => break Some(age),
            Err(_) => println!("Please enter a number."),
        }
    };
    let occupation = ask(input, "Occupation").await?;
    let stress_triggers = ask(input, "What are your main stress triggers?").await?;
    let habits = ask(input, "Addictions or habits you're managing (optional)").await?;

    Ok(ProfileForm {
        api_key,
        name,
        age,
        occupation,
        stress_triggers,
        habits,
    })
}

pub async fn run_terminal_chat(config: ChatConfig) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let template = PromptTemplate::resolve(config.prompt_path.as_deref())
        .context("Failed to load instruction template")?;
    let form = read_profile(&mut input).await?;
    let mut session = ChatSession::start(form, Arc::new(template), &config)?;

    println!();
    println!("{}", session.snapshot().greeting);
    println!("Type a message, /play to hear the last reply, /reset to start over, /quit to leave.");

    loop {
        let Some(line) = input.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                session.reset();
                println!("Conversation cleared.");
            }
            "/play" => {
                let last = session
                    .transcript()
                    .iter()
                    .rposition(|t| t.role() == Role::Assistant);
                let Some(index) = last else {
                    println!("Nothing to play yet.");
                    continue;
                };
                match session.request_playback(index).await? {
                    Playback::Audio(clip) => println!("Audio: {}", clip.path().display()),
                    Playback::NoAudio => println!("No audio available for that reply."),
                }
            }
            text => {
                println!("Analyzing...");
                match session.submit_message(text).await {
                    Ok(snapshot) => {
                        if let Some(reply) = snapshot.transcript.last() {
                            println!("\n{}\n", reply.content());
                        }
                    }
                    Err(e @ ChatError::Generation(_)) => {
                        println!("Sorry, {e}. Your message was not sent; please try again.");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    info!(turns = session.transcript().len(), "Leaving terminal chat");
    Ok(())
}
