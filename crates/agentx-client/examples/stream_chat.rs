use std::sync::Arc;

use agentx_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    agentx_client::init_observability();

    let credentials = Arc::new(InMemoryCredentials::new(
        std::env::var("AGENTX_ACCESS_TOKEN").ok(),
        std::env::var("AGENTX_REFRESH_TOKEN").ok(),
    ));
    let client = ApiClient::builder(ClientConfig::from_env()?)
        .credentials(credentials)
        .on_session_expired(|| eprintln!("session expired, sign in again"))
        .build()?;

    let prompt = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let prompt = if prompt.trim().is_empty() {
        "Build a simple todo app".to_string()
    } else {
        prompt
    };

    let project = client.create_project().await?;
    println!("project {}", project.id);

    let outcome = client
        .stream_chat(
            project.id,
            &prompt,
            StreamHandlers::new()
                .on_message(|m| println!("… {m}"))
                .on_file_write(|a| println!("✎ {} {:?}", a.message, a.files))
                .on_file_read(|a| println!("⌕ {} {:?}", a.message, a.files))
                .on_terminal(|t| {
                    println!("$ {}", t.command.as_deref().unwrap_or(&t.message));
                    if let Some(output) = t.output {
                        println!("{output}");
                    }
                })
                .on_complete(|c| {
                    println!("✓ {}", c.summary);
                    if let Some(url) = c.url {
                        println!("preview: {url}");
                    }
                })
                .on_error(|e| eprintln!("✗ {e}")),
        )
        .await;

    println!("stream {outcome:?}");
    Ok(())
}
