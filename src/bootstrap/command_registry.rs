use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::comm::AppConfiguration;

/// 构建完整的命令行应用
pub fn build_app() -> Command {
    Command::new("nymity")
        .version(env!("CARGO_PKG_VERSION"))
        .about("匿名消息服务 / Anonymous messaging service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("server")
                .about("启动 Web 服务器")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("设置服务器主机地址（覆盖配置）"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .value_parser(value_parser!(u16))
                        .help("设置服务器端口（覆盖配置）"),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("WORKERS")
                        .value_parser(value_parser!(usize))
                        .help("设置工作线程数（覆盖配置）"),
                )
                .arg(
                    Arg::new("debug")
                        .short('d')
                        .long("debug")
                        .help("启用调试模式")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("memory")
                        .long("memory")
                        .help("使用内存存储，忽略 database.url")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("migrate").about("执行数据库迁移"))
        .subcommand(Command::new("version").about("显示版本信息"))
}

/// `server` 子命令的覆盖项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub debug: bool,
    pub memory: bool,
}

impl ServerOverrides {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            host: matches.get_one::<String>("host").cloned(),
            port: matches.get_one::<u16>("port").copied(),
            workers: matches.get_one::<usize>("workers").copied(),
            debug: matches.get_flag("debug"),
            memory: matches.get_flag("memory"),
        }
    }

    /// 命令行参数优先于配置文件
    pub fn apply(&self, config: &mut AppConfiguration) {
        if let Some(host) = &self.host {
            config.server_host = host.clone();
        }
        if let Some(port) = self.port {
            config.server_port = port;
        }
        if let Some(workers) = self.workers {
            config.server_workers = Some(workers);
        }
        if self.debug {
            config.server_debug = true;
            config.logging_level = "debug".to_string();
        }
    }
}

/// 打印版本信息
pub fn handle_version_command() {
    println!("nymity {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_overrides() {
        let matches = build_app()
            .try_get_matches_from(["nymity", "server", "--port", "8088", "--memory", "-d"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "server");

        let overrides = ServerOverrides::from_matches(sub);
        assert_eq!(overrides.port, Some(8088));
        assert!(overrides.memory);

        let mut config = AppConfiguration::default();
        overrides.apply(&mut config);
        assert_eq!(config.server_port, 8088);
        assert!(config.server_debug);
        assert_eq!(config.logging_level, "debug");
        assert_eq!(config.server_host, AppConfiguration::default().server_host);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(build_app().try_get_matches_from(["nymity"]).is_err());
        assert!(build_app().try_get_matches_from(["nymity", "migrate"]).is_ok());
    }
}
