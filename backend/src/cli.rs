//! CLI 参数解析模块
//!
//! 使用 clap 定义命令行参数：启动服务、创建账户、查看 OTP 录入信息和限流状态。

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

/// portal-backend - 承包商门户认证后端
#[derive(Parser, Debug)]
#[command(name = "portal-backend")]
#[command(version)]
#[command(about = "OTP login, API token guard and JWT authentication for the contractor portal")]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动 HTTP 服务
    Serve,
    /// 创建账户并生成 OTP 密钥
    CreateAccount(CreateAccountArgs),
    /// 输出账户的 otpauth URI（用于在认证器 App 中录入）
    OtpUri(OtpUriArgs),
    /// 查看账户当前的 OTP 限流状态
    OtpStatus(AccountArgs),
}

/// 创建账户参数
#[derive(Args, Debug, Clone)]
pub struct CreateAccountArgs {
    /// 邮箱
    #[arg(long)]
    pub email: String,

    /// 显示名称
    #[arg(long)]
    pub name: String,

    /// 法定姓名
    #[arg(long)]
    pub legal_name: Option<String>,

    /// 偏好称呼
    #[arg(long)]
    pub preferred_name: Option<String>,
}

/// 按邮箱指定账户
#[derive(Args, Debug, Clone)]
pub struct AccountArgs {
    /// 邮箱
    #[arg(long)]
    pub email: String,
}

/// otp-uri 参数
#[derive(Args, Debug, Clone)]
pub struct OtpUriArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    /// 同时输出 QR 码（Data URL）
    #[arg(long, default_value_t = false)]
    pub qr: bool,
}

/// 解析命令行参数
pub fn parse_args() -> Cli {
    Cli::parse()
}
