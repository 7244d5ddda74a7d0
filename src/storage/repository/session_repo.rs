use crate::lenient;
use crate::storage::entity::session_kv::{
    self, ActiveModel as SessionKvActiveModel, Entity as SessionKv,
};
use chrono::Utc;
use log::warn;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

pub const KEY_USER: &str = "user";
pub const KEY_ACCESS_TOKEN: &str = "access_token";

/// 已登录用户。后端的 id 可能是数字，统一按字符串保存。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionUser {
    #[serde(deserialize_with = "lenient::id_as_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SessionUser {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub user: SessionUser,
    pub token: Option<String>,
}

pub struct SessionRepository;

impl SessionRepository {
    pub async fn get(db: &DatabaseConnection, key: &str) -> Result<Option<String>, sea_orm::DbErr> {
        let row = SessionKv::find_by_id(key.to_string()).one(db).await?;
        Ok(row.map(|m| m.value))
    }

    pub async fn set(
        db: &DatabaseConnection,
        key: &str,
        value: String,
    ) -> Result<(), sea_orm::DbErr> {
        let am = SessionKvActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_at: Set(Utc::now().timestamp()),
        };
        SessionKv::insert(am)
            .on_conflict(
                OnConflict::column(session_kv::Column::Key)
                    .update_columns([session_kv::Column::Value, session_kv::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn remove(db: &DatabaseConnection, key: &str) -> Result<(), sea_orm::DbErr> {
        SessionKv::delete_many()
            .filter(session_kv::Column::Key.eq(key))
            .exec(db)
            .await?;
        Ok(())
    }

    /// 读取已保存的会话。
    ///
    /// user 值为 "null" / "undefined" / 无法解析时视为脏数据：删除并按匿名处理。
    pub async fn load_session(
        db: &DatabaseConnection,
    ) -> Result<Option<StoredSession>, sea_orm::DbErr> {
        let raw = match Self::get(db, KEY_USER).await? {
            Some(v) => v,
            None => return Ok(None),
        };

        let trimmed = raw.trim();
        let parsed = if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
            None
        } else {
            match serde_json::from_str::<SessionUser>(trimmed) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("会话中的用户数据无法解析，已清除: {}", e);
                    None
                }
            }
        };

        let user = match parsed {
            Some(u) => u,
            None => {
                Self::remove(db, KEY_USER).await?;
                return Ok(None);
            }
        };

        let token = Self::get(db, KEY_ACCESS_TOKEN)
            .await?
            .filter(|t| !t.trim().is_empty());
        Ok(Some(StoredSession { user, token }))
    }

    pub async fn save_login(
        db: &DatabaseConnection,
        user: &SessionUser,
        token: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let json = serde_json::to_string(user)
            .map_err(|e| sea_orm::DbErr::Custom(format!("序列化用户失败: {}", e)))?;
        Self::set(db, KEY_USER, json).await?;
        Self::set(db, KEY_ACCESS_TOKEN, token.to_string()).await?;
        Ok(())
    }

    pub async fn clear(db: &DatabaseConnection) -> Result<(), sea_orm::DbErr> {
        Self::remove(db, KEY_USER).await?;
        Self::remove(db, KEY_ACCESS_TOKEN).await?;
        Ok(())
    }
}
