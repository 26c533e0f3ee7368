//! Binds one operation of an extension descriptor and invokes it once with a
//! demo executor that echoes its resolved arguments.
//!
//! ```text
//! opbind --extension search.json --operation search \
//!        --parameters '{"query": "#[payload.term]"}' --payload '{"term": "rust"}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use opbind_core::{ExtensionLoader, Value};
use opbind_runtime::logging::{init_tracing, LogFormat};
use opbind_runtime::processor::{
    DefaultConnectionSupplier, ExecutionContext, FnExecutor, OperationOutput, VecPagingProvider,
};
use opbind_runtime::{
    build_invocation_pipeline, BinderConfig, BuildRequest, ComponentRegistry, Event,
    ExtensionConfigurationRegistry, OperationBinder, Payload,
};
use tower::ServiceExt;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "opbind", about = "Bind and invoke a declared operation")]
struct Cli {
    /// Path to the extension descriptor (JSON).
    #[arg(long, env = "OPBIND_EXTENSION")]
    extension: PathBuf,

    /// Operation to bind.
    #[arg(long)]
    operation: String,

    /// Raw parameter values as a JSON object.
    #[arg(long, default_value = "{}")]
    parameters: String,

    /// Event payload as JSON.
    #[arg(long, default_value = "null")]
    payload: String,

    /// Store the result in this variable instead of the payload.
    #[arg(long)]
    target: Option<String>,

    /// Invocation timeout in milliseconds.
    #[arg(long, env = "OPBIND_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    /// Replay paged results instead of streaming them once.
    #[arg(long)]
    repeatable: bool,

    #[arg(long, value_enum, env = "OPBIND_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn parse_json(what: &str, raw: &str) -> anyhow::Result<Value> {
    let json: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("invalid {what} JSON"))?;
    Ok(Value::from(json))
}

fn echo(ctx: ExecutionContext) -> anyhow::Result<OperationOutput> {
    let arguments = Value::from(ctx.arguments);
    if ctx.operation.is_paged() {
        Ok(OperationOutput::Paged(Box::new(VecPagingProvider::new(vec![vec![arguments]]))))
    } else {
        Ok(OperationOutput::Value(arguments))
    }
}

async fn render(payload: &Payload) -> anyhow::Result<serde_json::Value> {
    match payload {
        Payload::Value(value) => Ok(value.clone().into()),
        Payload::Cursor(provider) => {
            let items = provider.open()?.collect_all().await?;
            Ok(Value::Array(items).into())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let descriptor = std::fs::read_to_string(&cli.extension)
        .with_context(|| format!("failed to read {}", cli.extension.display()))?;
    let extension = Arc::new(ExtensionLoader::default().load_json(&descriptor)?);

    let Value::Map(parameters) = parse_json("parameters", &cli.parameters)? else {
        anyhow::bail!("--parameters must be a JSON object");
    };
    let payload = parse_json("payload", &cli.payload)?;

    let config = BinderConfig {
        invocation_timeout_ms: cli.timeout_ms,
        repeatable_cursors: cli.repeatable,
        ..BinderConfig::default()
    };

    let components = Arc::new(ComponentRegistry::new());
    components.register_connection_supplier(Arc::new(DefaultConnectionSupplier::default()));
    for operation in &extension.operations {
        components.register_executor(
            extension.name.clone(),
            operation.name.clone(),
            Arc::new(FnExecutor::new(echo)),
        );
    }

    let binder = OperationBinder::new(
        components,
        Arc::new(ExtensionConfigurationRegistry::new()),
        &config,
    );

    let mut request = BuildRequest::new(Arc::clone(&extension), cli.operation)
        .with_parameters(parameters);
    if let Some(target) = &cli.target {
        request = request.with_target(target.clone());
    }
    let processor = binder.bind(request)?;

    let event = build_invocation_pipeline(processor, &config)
        .oneshot(Event::new(payload))
        .await?;

    let mut variables = serde_json::Map::new();
    for (name, value) in event.variables() {
        variables.insert(name.to_string(), render(value).await?);
    }
    let output = serde_json::json!({
        "correlationId": event.correlation_id().to_string(),
        "payload": render(event.payload()).await?,
        "variables": variables,
    });
    info!(extension = %extension.name, "invocation finished");
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
