use std::sync::Arc;

use aden::config::ServerConfig;
use aden::core::wait_for_signal;
use aden::database::StaticData;
use aden::game::Scripting;
use aden::repo::{MySqlStore, Repos};
use aden::servers::map::GameServer;
use anyhow::{Context, Result};
use sqlx::mysql::MySqlPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/server.yaml".to_string();
    let mut memory = false;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: game_server [--conf FILE] [--memory]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            "--memory" => memory = true,
            _ => {}
        }
        i += 1;
    }

    let config = ServerConfig::from_file(&conf_file).with_context(|| format!("Cannot load config: {}", conf_file))?;

    let data = StaticData::load(&config.data_dir, &config.maps_dir)
        .with_context(|| format!("Cannot load static data: {}", config.data_dir))?;

    let repos = if memory {
        tracing::warn!("[game] [memory_store] nothing will be persisted");
        Repos::memory().0
    } else {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.sql_max_connections)
            .connect(&config.database_url())
            .await
            .with_context(|| format!("Cannot connect to DB: {}", config.sql_ip))?;
        if config.run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await.context("Cannot apply migrations")?;
            tracing::info!("[repo] [migrated]");
        }
        Repos::from_store(Arc::new(MySqlStore::new(pool)))
    };

    let scripting = load_scripting(&config)?;
    let bind = config.bind_addr();
    let srv = GameServer::new(config, Arc::new(data), repos, scripting);
    srv.load_clans().await.context("Cannot load clans")?;
    srv.state.set_term_func(|| tracing::info!("[game] [shutdown] requested"));

    let ticks = tokio::spawn(Arc::clone(&srv).run_ticks());
    {
        let srv = Arc::clone(&srv);
        tokio::spawn(async move {
            let sig = wait_for_signal().await;
            tracing::info!("[game] [signal] {:?}", sig);
            srv.state.request_shutdown();
        });
    }

    tracing::info!("[game] [started] Game Server Started");
    let served = Arc::clone(&srv).run(&bind).await;
    srv.state.request_shutdown();
    if let Err(e) = ticks.await {
        tracing::error!("[game] [tick_task_failed] error={}", e);
    }
    served
}

#[cfg(feature = "lua")]
fn load_scripting(config: &ServerConfig) -> Result<Arc<dyn Scripting>> {
    let lua = aden::game::scripting::LuaScripting::load(&config.scripts_dir)
        .with_context(|| format!("Cannot load scripts: {}", config.scripts_dir))?;
    Ok(Arc::new(lua))
}

#[cfg(not(feature = "lua"))]
fn load_scripting(_config: &ServerConfig) -> Result<Arc<dyn Scripting>> {
    Ok(Arc::new(aden::game::StdFormulas))
}
