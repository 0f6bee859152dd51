//! Relaychat command-line client.

use clap::Parser;
use relaychat::cli::{
    ChatArgs, Cli, Commands, handle_chat_command, handle_conversations_command,
    handle_health_command, handle_upload_command,
};
use relaychat::{ClientConfig, JsonFileStore, SendOutcome, init_cli_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_cli_tracing(cli.log_format);

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.relay_url {
        config = config.with_relay_url(url);
    }
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => JsonFileStore::default_location()?,
    };
    let store = JsonFileStore::new(data_dir);
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Health => handle_health_command(&config, &mut stdout).await?,
        Commands::Upload { file } => {
            handle_upload_command(&config, &file, &mut stdout).await?;
        }
        Commands::Chat {
            conversation,
            files,
            no_save,
            prompt,
        } => {
            let args = ChatArgs {
                conversation,
                files,
                prompt: prompt.join(" "),
                save: !no_save,
            };
            let report = handle_chat_command(&config, &store, args, &mut stdout).await?;
            if !no_save {
                eprintln!("conversation: {}", report.conversation_id);
            }
            if matches!(report.outcome, SendOutcome::Failed { .. }) {
                std::process::exit(1);
            }
        }
        Commands::Conversations { json } => {
            handle_conversations_command(&store, json, &mut stdout).await?;
        }
    }

    Ok(())
}
