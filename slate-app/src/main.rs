use std::path::PathBuf;

use slate_config::{AppConfig, ConfigError, FrontendMode};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    mode: Option<FrontendMode>,
    config: Option<PathBuf>,
    port: Option<u16>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--demo" => parsed.mode = Some(FrontendMode::Demo),
            "--remote" => parsed.mode = Some(FrontendMode::Remote),
            "--config" => {
                let Some(path) = args.next() else {
                    return Err("`--config` 需要提供配置文件路径".to_string());
                };
                parsed.config = Some(PathBuf::from(path));
            }
            "--port" => {
                let Some(raw) = args.next() else {
                    return Err("`--port` 需要提供端口号".to_string());
                };
                let port = raw
                    .parse::<u16>()
                    .map_err(|_| format!("无效的端口号：{raw}"))?;
                parsed.port = Some(port);
            }
            other => return Err(format!("未知参数：{other}")),
        }
    }
    Ok(parsed)
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };

    let mut config = load_configuration(args.config);
    if let Some(port) = args.port {
        config.remote.port = port;
    }
    init_logging(&config);
    info!("启动 Slate 同步客户端");

    let mode = args.mode.unwrap_or(config.frontend.default_mode);
    match mode {
        FrontendMode::Remote => {
            info!(port = config.remote.port, "以远程同步模式启动");
            if let Err(err) = slate_frontend::run_remote(&config) {
                error!(error = %err, "远程同步前端异常退出");
                std::process::exit(1);
            }
        }
        FrontendMode::Demo => {
            info!("以离线演示模式启动");
            if let Err(err) = slate_frontend::run_cli_demo(&config) {
                error!(error = %err, "执行 CLI 演示失败");
                std::process::exit(1);
            }
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
