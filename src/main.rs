use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use locsync::backend::{HttpBackend, LocationApi};
use locsync::channel::WsConnector;
use locsync::config::Config;
use locsync::map::LogSurface;
use locsync::model::Group;
use locsync::session::Session;
use locsync::source::LineSource;
use locsync::view::GroupView;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = Config::parse();
    let api: Arc<dyn LocationApi> = Arc::new(HttpBackend::new(
        config.backend_url.clone(),
        config.token.clone(),
    )?);

    let session = Session::start(
        &config.credentials(),
        api.clone(),
        LineSource::new(config.fix_input()),
    )?;

    let groups = match api.list_groups(session.identity()).await {
        Ok(groups) => groups,
        Err(err) => {
            error!(error = %err, "failed to list groups");
            Vec::new()
        }
    };
    for group in &groups {
        info!(id = %group.id, name = %group.name, "group");
    }

    let Some(selector) = config.group.clone() else {
        session.end().await;
        return Ok(());
    };
    let group = groups
        .into_iter()
        .find(|group| group.id == selector || group.name == selector)
        .unwrap_or_else(|| {
            warn!(group = %selector, "group not in your list, opening by id");
            Group {
                id: selector.clone(),
                name: selector.clone(),
            }
        });

    let (view, handle, rx) = GroupView::new(
        session.identity(),
        api,
        Arc::new(WsConnector::new(config.stream_url.clone())),
        LogSurface::new(),
        config.fitter(),
    );
    let view = tokio::spawn(view.run(rx));
    handle.open(group);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown();
    view.await?;
    session.end().await;

    Ok(())
}
