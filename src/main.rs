use clap::ArgMatches;
use std::error::Error;

use nymity::bootstrap::{build_app, handle_version_command, AppBootstrap, ServerOverrides};
use nymity::comm::enhanced_config::EnhancedConfigManager;
use nymity::comm::logging::init_tracing;
use nymity::error::AppError;
use nymity::store::Database;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches: ArgMatches = build_app().get_matches();

    match matches.subcommand() {
        Some(("server", sub_matches)) => {
            handle_server_command(sub_matches).await?;
        }
        Some(("migrate", _)) => {
            handle_migrate_command().await?;
        }
        Some(("version", _)) => {
            handle_version_command();
        }
        _ => {
            // subcommand_required(true) 保证不会到这里
            eprintln!("未知命令，请使用 --help 查看可用命令");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn handle_server_command(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let overrides = ServerOverrides::from_matches(matches);

    let mut config_manager = EnhancedConfigManager::new()?;
    overrides.apply(config_manager.app_config_mut());

    let app_config = config_manager.get_app_config().clone();
    init_tracing(&app_config.logging_level, app_config.logging_json_format);

    config_manager.validate_required_config()?;
    config_manager.print_config_summary();

    AppBootstrap::new(app_config)
        .with_memory_store(overrides.memory)
        .run()
        .await?;

    Ok(())
}

async fn handle_migrate_command() -> Result<(), Box<dyn Error>> {
    let config_manager = EnhancedConfigManager::new()?;
    let app_config = config_manager.get_app_config();
    init_tracing(&app_config.logging_level, false);

    let url = app_config
        .database_url
        .clone()
        .ok_or_else(|| AppError::validation("database.url", "未配置数据库连接"))?;

    Database::new(url, app_config.database_max_connections)
        .migrate()
        .await
        .map_err(AppError::from)?;
    println!("数据库迁移完成");
    Ok(())
}
