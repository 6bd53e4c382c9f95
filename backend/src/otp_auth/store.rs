//! 账户存储模块
//!
//! 负责 `config/accounts.json` 的读写，保存账户信息及每个账户的 OTP 失败跟踪状态。

use crate::otp_auth::totp::TotpRsEngine;
use crate::otp_auth::types::{Account, NewAccount, OtpAccountState};
use crate::otp_auth::AuthError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

/// 默认账户文件路径
pub const DEFAULT_ACCOUNT_STORE_PATH: &str = "config/accounts.json";

/// 账户文件内容
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AccountFile {
    /// 下一个可用的账户 ID
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    accounts: Vec<Account>,
}

impl AccountFile {
    fn allocate_id(&mut self) -> u64 {
        let max_existing = self.accounts.iter().map(|a| a.id).max().unwrap_or(0);
        let id = self.next_id.max(max_existing + 1).max(1);
        self.next_id = id + 1;
        id
    }
}

/// 账户存储
///
/// 内存中保存完整的账户列表，每次修改后整体写回文件。
pub struct AccountStore {
    /// 存储文件路径，None 表示仅内存存储
    path: Option<PathBuf>,
    /// 内存中的账户数据
    data: RwLock<AccountFile>,
    /// 串行化文件写入
    write_lock: Mutex<()>,
}

impl AccountStore {
    /// 创建新的 AccountStore 实例（数据为空，需调用 [`load`](Self::load)）
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            data: RwLock::new(AccountFile::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// 创建仅内存存储的 AccountStore，所有操作都不会访问磁盘
    pub fn new_in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(AccountFile::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// 从文件加载账户
    ///
    /// 如果文件不存在，保持空存储。
    /// 如果文件存在但格式错误，返回错误。
    pub async fn load(&self) -> Result<(), AuthError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };

        if !path.exists() {
            tracing::debug!("Account file not found, starting empty: {:?}", path);
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| AuthError::StorageError(format!("failed to read account file: {}", e)))?;

        let file: AccountFile = serde_json::from_str(&content)
            .map_err(|e| AuthError::StorageError(format!("failed to parse account file: {}", e)))?;

        let count = file.accounts.len();
        *self.data.write().await = file;

        tracing::info!("Loaded {} accounts from {:?}", count, path);
        Ok(())
    }

    /// 保存账户到文件
    ///
    /// 自动创建父目录（如果不存在）。
    pub async fn save(&self) -> Result<(), AuthError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AuthError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let content = {
            let data = self.data.read().await;
            serde_json::to_string_pretty(&*data)
                .map_err(|e| AuthError::StorageError(format!("failed to serialize accounts: {}", e)))?
        };

        fs::write(path, content)
            .await
            .map_err(|e| AuthError::StorageError(format!("failed to write account file: {}", e)))?;

        tracing::debug!("Accounts saved: {:?}", path);
        Ok(())
    }

    /// 创建账户
    ///
    /// 未提供 OTP 密钥时自动生成；邮箱（忽略大小写）重复时返回 `AccountExists`。
    pub async fn create_account(&self, new: NewAccount) -> Result<Account, AuthError> {
        let email = new.email.trim().to_string();
        if email.is_empty() {
            return Err(AuthError::EmailRequired);
        }

        let secret = match new.otp_secret.filter(|s| !s.trim().is_empty()) {
            Some(s) => s,
            None => TotpRsEngine::generate_secret(),
        };

        let account = {
            let mut data = self.data.write().await;
            if data
                .accounts
                .iter()
                .any(|a| a.email.eq_ignore_ascii_case(&email))
            {
                return Err(AuthError::AccountExists(email));
            }

            let account = Account {
                id: data.allocate_id(),
                email,
                name: new.name,
                legal_name: new.legal_name,
                preferred_name: new.preferred_name,
                created_at: Utc::now(),
                otp: OtpAccountState::new(secret),
            };
            data.accounts.push(account.clone());
            account
        };

        if let Err(e) = self.save().await {
            // 写盘失败时撤销内存中的新账户，保持内存与文件一致
            self.data.write().await.accounts.retain(|a| a.id != account.id);
            return Err(e);
        }

        tracing::info!("Account created: id={}, email={}", account.id, account.email);
        Ok(account)
    }

    /// 按邮箱查找账户（忽略大小写和首尾空白）
    pub async fn find_by_email(&self, email: &str) -> Option<Account> {
        let email = email.trim();
        self.data
            .read()
            .await
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    /// 按 ID 查找账户
    pub async fn find_by_id(&self, id: u64) -> Option<Account> {
        self.data
            .read()
            .await
            .accounts
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// 读取账户的 OTP 状态
    pub async fn otp_state(&self, id: u64) -> Result<OtpAccountState, AuthError> {
        self.find_by_id(id)
            .await
            .map(|a| a.otp)
            .ok_or(AuthError::AccountNotFound(id))
    }

    /// 写回账户的 OTP 失败跟踪状态并持久化
    ///
    /// 密钥创建后不可修改，这里只更新失败计数和窗口起点。
    /// 写盘失败时恢复原来的值。
    pub async fn save_otp_state(&self, id: u64, state: &OtpAccountState) -> Result<(), AuthError> {
        let previous = self.set_otp_counters(id, state).await?;

        if let Err(e) = self.save().await {
            self.set_otp_counters(id, &previous).await?;
            return Err(e);
        }
        Ok(())
    }

    /// 更新内存中的失败计数和窗口起点，返回更新前的状态
    async fn set_otp_counters(
        &self,
        id: u64,
        state: &OtpAccountState,
    ) -> Result<OtpAccountState, AuthError> {
        let mut data = self.data.write().await;
        let account = data
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AuthError::AccountNotFound(id))?;
        let previous = account.otp.clone();
        account.otp.failed_attempts_count = state.failed_attempts_count;
        account.otp.first_failed_at = state.first_failed_at;
        Ok(previous)
    }

    /// 账户数量
    pub async fn len(&self) -> usize {
        self.data.read().await.accounts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 获取存储文件路径
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// 创建指定路径的 AccountStore 并加载已有数据
pub async fn open_account_store<P: AsRef<Path>>(path: P) -> Result<AccountStore, AuthError> {
    let store = AccountStore::new(path);
    store.load().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            name: "Test User".to_string(),
            ..Default::default()
        }
    }

    fn create_test_store() -> (AccountStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("accounts.json");
        (AccountStore::new(&path), temp_dir)
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let (store, _temp) = create_test_store();
        assert!(store.is_empty().await);
        assert!(store.find_by_email("a@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_create_account_generates_secret() {
        let store = AccountStore::new_in_memory();
        let account = store.create_account(new_account("alice@example.com")).await.unwrap();

        assert_eq!(account.id, 1);
        assert!(TotpRsEngine::is_valid_secret(&account.otp.secret));
        assert!(account.otp.is_clear());
    }

    #[tokio::test]
    async fn test_create_account_keeps_given_secret() {
        let store = AccountStore::new_in_memory();
        let mut new = new_account("bob@example.com");
        new.otp_secret = Some("JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP".to_string());
        let account = store.create_account(new).await.unwrap();
        assert_eq!(account.otp.secret, "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = AccountStore::new_in_memory();
        store.create_account(new_account("alice@example.com")).await.unwrap();
        let result = store.create_account(new_account("ALICE@example.com")).await;
        assert!(matches!(result, Err(AuthError::AccountExists(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_email_rejected() {
        let store = AccountStore::new_in_memory();
        let result = store.create_account(new_account("  ")).await;
        assert!(matches!(result, Err(AuthError::EmailRequired)));
    }

    #[tokio::test]
    async fn test_find_by_email_case_insensitive() {
        let store = AccountStore::new_in_memory();
        let created = store.create_account(new_account("Carol@Example.com")).await.unwrap();
        let found = store.find_by_email(" carol@example.com ").await.unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();
        let account = store.create_account(new_account("dave@example.com")).await.unwrap();

        let failed_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let state = account.otp.with_failure(failed_at).with_failure(failed_at);
        store.save_otp_state(account.id, &state).await.unwrap();

        let store2 = open_account_store(store.path().unwrap()).await.unwrap();
        let loaded = store2.find_by_id(account.id).await.unwrap();
        assert_eq!(loaded.email, "dave@example.com");
        assert_eq!(loaded.otp.failed_attempts_count, 2);
        assert_eq!(loaded.otp.first_failed_at, Some(failed_at));
        assert_eq!(loaded.otp.secret, account.otp.secret);

        // ID 分配在重新加载后继续递增
        let next = store2.create_account(new_account("erin@example.com")).await.unwrap();
        assert_eq!(next.id, account.id + 1);
    }

    #[tokio::test]
    async fn test_save_otp_state_ignores_secret() {
        let store = AccountStore::new_in_memory();
        let account = store.create_account(new_account("frank@example.com")).await.unwrap();

        let tampered = OtpAccountState::new("OTHERSECRET");
        store.save_otp_state(account.id, &tampered).await.unwrap();
        assert_eq!(store.otp_state(account.id).await.unwrap().secret, account.otp.secret);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let store = AccountStore::new_in_memory();
        assert!(matches!(
            store.otp_state(42).await,
            Err(AuthError::AccountNotFound(42))
        ));
        assert!(matches!(
            store.save_otp_state(42, &OtpAccountState::default()).await,
            Err(AuthError::AccountNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_create_account_rolled_back_when_save_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = AccountStore::new(blocker.join("accounts.json"));

        let first = store.create_account(new_account("a@example.com")).await;
        assert!(matches!(first, Err(AuthError::StorageError(_))));
        assert!(store.is_empty().await);
        assert!(store.find_by_email("a@example.com").await.is_none());

        // 重试仍然是存储错误，而不是 AccountExists
        let second = store.create_account(new_account("a@example.com")).await;
        assert!(matches!(second, Err(AuthError::StorageError(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_save_otp_state_restored_when_save_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("data");
        let store = AccountStore::new(dir.join("accounts.json"));
        let account = store.create_account(new_account("a@example.com")).await.unwrap();

        // 把数据目录换成普通文件，使后续写盘失败
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, "").unwrap();

        let failed_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let state = account.otp.with_failure(failed_at);
        let result = store.save_otp_state(account.id, &state).await;
        assert!(matches!(result, Err(AuthError::StorageError(_))));

        let current = store.otp_state(account.id).await.unwrap();
        assert!(current.is_clear());
        assert_eq!(current, account.otp);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let (store, _temp) = create_test_store();
        store.load().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("accounts.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = AccountStore::new(&path);
        assert!(matches!(store.load().await, Err(AuthError::StorageError(_))));
    }
}
