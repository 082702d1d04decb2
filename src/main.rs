use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tutor_rag::api;
use tutor_rag::app_state::AppState;
use tutor_rag::config::AppConfig;
use tutor_rag::models::ChatMessage;

/// Backend RAG del asistente educativo.
#[derive(Parser, Debug)]
#[command(name = "tutor_rag", version, about)]
struct Cli {
    /// Reconstruye todos los índices antes de arrancar el servidor.
    #[arg(long)]
    update: bool,

    /// Responde a una única pregunta, la imprime y termina.
    #[arg(long, value_name = "PREGUNTA")]
    answer: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 2. Cargar configuración y construir los componentes
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    let app_state = AppState::from_config(cfg).context("Error inicializando los componentes")?;

    // 3. Modos de línea de comandos
    if let Some(question) = cli.answer {
        let answer = app_state.answer(&[ChatMessage::user(question)]).await?;
        println!("{answer}");
        return Ok(());
    }

    if cli.update {
        if !app_state.try_begin_update() {
            anyhow::bail!("Ya hay una actualización en curso");
        }
        match app_state.run_update().await {
            Ok(report) => info!("{report}"),
            Err(err) => {
                error!("La actualización falló; los índices pueden estar incompletos: {err}");
                return Err(err.into());
            }
        }
    }

    // 4. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 5. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
