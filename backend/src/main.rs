//! portal-backend - 承包商门户认证后端
//!
//! # 使用方式
//!
//! ```bash
//! # 启动服务
//! portal-backend serve --config config/app.toml
//!
//! # 创建账户（自动生成 OTP 密钥）
//! portal-backend create-account --email alice@example.com --name "Alice"
//!
//! # 输出 otpauth URI 供认证器 App 录入
//! portal-backend otp-uri --email alice@example.com --qr
//!
//! # 查看限流状态
//! portal-backend otp-status --email alice@example.com
//! ```

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use portal_backend::cli::{parse_args, Commands};
use portal_backend::config::AppConfig;
use portal_backend::otp_auth::{
    create_auth_state, open_account_store, NewAccount, TotpRsEngine,
};
use portal_backend::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = parse_args();

    let mut config = AppConfig::load(&cli.config)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    let config = config.finalize()?;

    match cli.command {
        Commands::Serve => {
            info!("Starting portal backend");
            server::serve(config).await?;
        }
        Commands::CreateAccount(args) => {
            let store = open_account_store(&config.storage.accounts_path).await?;
            let account = store
                .create_account(NewAccount {
                    email: args.email,
                    name: args.name,
                    legal_name: args.legal_name,
                    preferred_name: args.preferred_name,
                    otp_secret: None,
                })
                .await?;
            let uri = TotpRsEngine::provisioning_uri(
                &account.otp.secret,
                &config.otp.issuer,
                &account.email,
            )?;
            println!("Created account {} <{}>", account.id, account.email);
            println!("{}", uri);
        }
        Commands::OtpUri(args) => {
            let store = open_account_store(&config.storage.accounts_path).await?;
            let account = store
                .find_by_email(&args.account.email)
                .await
                .with_context(|| format!("no account for {}", args.account.email))?;
            let secret = &account.otp.secret;
            println!(
                "{}",
                TotpRsEngine::provisioning_uri(secret, &config.otp.issuer, &account.email)?
            );
            if args.qr {
                println!(
                    "{}",
                    TotpRsEngine::qr_code_data_url(secret, &config.otp.issuer, &account.email)?
                );
            }
        }
        Commands::OtpStatus(args) => {
            let store = Arc::new(open_account_store(&config.storage.accounts_path).await?);
            let account = store
                .find_by_email(&args.email)
                .await
                .with_context(|| format!("no account for {}", args.email))?;
            let state = create_auth_state(&config, store);
            let status = state.authenticator.status(account.id, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
