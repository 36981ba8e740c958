//! SeaORM-backed user and usage storage.
//!
//! # Example
//!
//! ```rust,ignore
//! use lessonforge::billing::SeaOrmStore;
//!
//! let store = SeaOrmStore::new(db.clone());
//! store.ensure_schema().await?;
//! let customers = CustomerManager::new(store.clone(), stripe_client);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Schema, Set, sea_query::OnConflict,
};

use super::storage::{UsageStore, User, UserStore};
use crate::auth::Identity;
use crate::error::{LessonForgeError, Result};

use entity::{lesson_plan_generation, user};

mod entity {
    pub mod user {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "users")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub email: String,
            pub name: Option<String>,
            pub stripe_customer_id: Option<String>,
            pub created_at: DateTimeUtc,
            pub updated_at: DateTimeUtc,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    /// One row per generated lesson plan.
    pub mod lesson_plan_generation {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "lesson_plan_generations")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            #[sea_orm(indexed)]
            pub user_id: String,
            pub created_at: DateTimeUtc,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

fn model_to_user(model: user::Model) -> User {
    User {
        id: model.id,
        email: model.email,
        name: model.name,
        stripe_customer_id: model.stripe_customer_id,
    }
}

/// SeaORM implementation of [`UserStore`] and [`UsageStore`].
#[derive(Clone, Debug)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the `users` and `lesson_plan_generations` tables if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut users = schema.create_table_from_entity(user::Entity);
        users.if_not_exists();
        self.db.execute(backend.build(&users)).await?;

        let mut generations = schema.create_table_from_entity(lesson_plan_generation::Entity);
        generations.if_not_exists();
        self.db.execute(backend.build(&generations)).await?;

        for mut index in schema.create_index_from_entity(lesson_plan_generation::Entity) {
            index.if_not_exists();
            self.db.execute(backend.build(&index)).await?;
        }

        tracing::debug!(target: "lessonforge::billing", "billing schema ready");
        Ok(())
    }
}

#[async_trait]
impl UserStore for SeaOrmStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        tracing::debug!(user_id = %user_id, "fetching user");

        let model = user::Entity::find_by_id(user_id).one(&self.db).await?;
        Ok(model.map(model_to_user))
    }

    async fn upsert_user(&self, identity: &Identity) -> Result<User> {
        tracing::debug!(user_id = %identity.id, "upserting user");

        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(identity.id.clone()),
            email: Set(identity.email.clone()),
            name: Set(identity.name.clone()),
            stripe_customer_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // stripe_customer_id and created_at survive the conflict update
        user::Entity::insert(model)
            .on_conflict(
                OnConflict::column(user::Column::Id)
                    .update_columns([user::Column::Email, user::Column::Name, user::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.get_user(&identity.id)
            .await?
            .ok_or_else(|| LessonForgeError::internal("User missing after upsert"))
    }

    async fn set_stripe_customer_id(&self, user_id: &str, customer_id: &str) -> Result<()> {
        tracing::debug!(
            user_id = %user_id,
            customer_id = %customer_id,
            "setting stripe customer id"
        );

        let existing = user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| LessonForgeError::not_found(format!("User {} not found", user_id)))?;

        let mut model: user::ActiveModel = existing.into();
        model.stripe_customer_id = Set(Some(customer_id.to_string()));
        model.updated_at = Set(Utc::now());
        model.update(&self.db).await?;

        Ok(())
    }
}

#[async_trait]
impl UsageStore for SeaOrmStore {
    async fn count_usage_events(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<u32> {
        tracing::debug!(
            user_id = %user_id,
            window_start = %window_start,
            window_end = %window_end,
            "counting lesson plan generations"
        );

        let count = lesson_plan_generation::Entity::find()
            .filter(lesson_plan_generation::Column::UserId.eq(user_id))
            .filter(lesson_plan_generation::Column::CreatedAt.gte(window_start))
            .filter(lesson_plan_generation::Column::CreatedAt.lte(window_end))
            .count(&self.db)
            .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn record_usage_event(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        tracing::debug!(user_id = %user_id, at = %at, "recording lesson plan generation");

        lesson_plan_generation::ActiveModel {
            user_id: Set(user_id.to_string()),
            created_at: Set(at),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use sea_orm::{ConnectOptions, Database};

    async fn store() -> SeaOrmStore {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();

        let store = SeaOrmStore::new(db);
        store.ensure_schema().await.unwrap();
        store
    }

    fn identity(email: &str) -> Identity {
        Identity {
            id: "user_1".to_string(),
            email: email.to_string(),
            name: Some("Ms. Frizzle".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_preserves_customer_id() {
        let store = store().await;

        let created = store.upsert_user(&identity("old@school.edu")).await.unwrap();
        assert_eq!(created.stripe_customer_id, None);

        store.set_stripe_customer_id("user_1", "cus_123").await.unwrap();
        let updated = store.upsert_user(&identity("new@school.edu")).await.unwrap();

        assert_eq!(updated.email, "new@school.edu");
        assert_eq!(updated.stripe_customer_id.as_deref(), Some("cus_123"));
    }

    #[tokio::test]
    async fn test_set_customer_for_unknown_user() {
        let store = store().await;
        let err = store.set_stripe_customer_id("ghost", "cus_1").await.unwrap_err();
        assert!(matches!(err, LessonForgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_usage_count_is_inclusive_and_per_user() {
        let store = store().await;
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(30);

        store.record_usage_event("user_1", start).await.unwrap();
        store.record_usage_event("user_1", end).await.unwrap();
        store.record_usage_event("user_1", start + Duration::days(3)).await.unwrap();
        store
            .record_usage_event("user_1", start - Duration::seconds(1))
            .await
            .unwrap();
        store
            .record_usage_event("user_1", end + Duration::seconds(1))
            .await
            .unwrap();
        store.record_usage_event("user_2", start + Duration::days(3)).await.unwrap();

        assert_eq!(store.count_usage_events("user_1", start, end).await.unwrap(), 3);
        assert_eq!(store.count_usage_events("user_2", start, end).await.unwrap(), 1);
        assert_eq!(store.count_usage_events("nobody", start, end).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_schema_is_repeatable() {
        let store = store().await;
        store.ensure_schema().await.unwrap();
    }
}
