use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::analytics::{CountryStat, DailyVolumeStat, ParcelCounts};
use crate::models::content::AdContentRow;
use crate::models::event::{AdEventRow, EventKind, EventMeta};
use crate::models::notification::NotificationRow;
use crate::models::user::UserRow;
use crate::models::website::{NewWebsite, WebsiteRow};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // -- User Operations --

    /// Wallet address is the identity; repeated registration updates the
    /// profile fields without clobbering them with NULLs.
    pub async fn upsert_user(
        &self,
        wallet_address: &str,
        email: Option<&str>,
        name: Option<&str>,
        role: &str,
        profile: Option<serde_json::Value>,
    ) -> anyhow::Result<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"INSERT INTO users (wallet_address, email, name, role, profile)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (wallet_address) DO UPDATE
               SET email = COALESCE(EXCLUDED.email, users.email),
                   name = COALESCE(EXCLUDED.name, users.name),
                   role = EXCLUDED.role,
                   profile = COALESCE(EXCLUDED.profile, users.profile),
                   updated_at = NOW()
               RETURNING wallet_address, email, name, role, profile, created_at, updated_at"#,
        )
        .bind(wallet_address)
        .bind(email)
        .bind(name)
        .bind(role)
        .bind(profile)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_user(&self, wallet_address: &str) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT wallet_address, email, name, role, profile, created_at, updated_at FROM users WHERE wallet_address = $1"
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_users(&self, role: Option<&str>) -> anyhow::Result<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"SELECT wallet_address, email, name, role, profile, created_at, updated_at
               FROM users
               WHERE ($1::TEXT IS NULL OR role = $1)
               ORDER BY created_at DESC"#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Website Operations --

    pub async fn insert_website(&self, site: &NewWebsite) -> Result<WebsiteRow, sqlx::Error> {
        sqlx::query_as::<_, WebsiteRow>(
            r#"INSERT INTO websites (owner_address, name, url, category, traffic_tier, language, keywords, geo_reach)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id, owner_address, name, url, category, traffic_tier, language, keywords, geo_reach, ipfs_hash, created_at, updated_at"#,
        )
        .bind(&site.owner_address)
        .bind(&site.name)
        .bind(&site.url)
        .bind(&site.category)
        .bind(&site.traffic_tier)
        .bind(&site.language)
        .bind(&site.keywords)
        .bind(&site.geo_reach)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_websites(&self, owner: Option<&str>) -> anyhow::Result<Vec<WebsiteRow>> {
        let rows = sqlx::query_as::<_, WebsiteRow>(
            r#"SELECT id, owner_address, name, url, category, traffic_tier, language, keywords, geo_reach, ipfs_hash, created_at, updated_at
               FROM websites
               WHERE ($1::TEXT IS NULL OR owner_address = $1)
               ORDER BY created_at DESC"#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_website(&self, id: Uuid) -> anyhow::Result<Option<WebsiteRow>> {
        let row = sqlx::query_as::<_, WebsiteRow>(
            r#"SELECT id, owner_address, name, url, category, traffic_tier, language, keywords, geo_reach, ipfs_hash, created_at, updated_at
               FROM websites WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_website(
        &self,
        id: Uuid,
        site: &NewWebsite,
    ) -> Result<Option<WebsiteRow>, sqlx::Error> {
        sqlx::query_as::<_, WebsiteRow>(
            r#"UPDATE websites
               SET name = $2, url = $3, category = $4, traffic_tier = $5,
                   language = $6, keywords = $7, geo_reach = $8, updated_at = NOW()
               WHERE id = $1
               RETURNING id, owner_address, name, url, category, traffic_tier, language, keywords, geo_reach, ipfs_hash, created_at, updated_at"#,
        )
        .bind(id)
        .bind(&site.name)
        .bind(&site.url)
        .bind(&site.category)
        .bind(&site.traffic_tier)
        .bind(&site.language)
        .bind(&site.keywords)
        .bind(&site.geo_reach)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a website, returning its pinned metadata hash so the caller
    /// can unpin it.
    pub async fn delete_website(&self, id: Uuid) -> anyhow::Result<Option<Option<String>>> {
        let hash = sqlx::query_scalar::<_, Option<String>>(
            "DELETE FROM websites WHERE id = $1 RETURNING ipfs_hash",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    pub async fn set_website_ipfs_hash(&self, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE websites SET ipfs_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Ad Content Operations --

    pub async fn insert_content(
        &self,
        announcer_address: &str,
        title: &str,
        description: &str,
        link_url: &str,
        image_url: &str,
    ) -> Result<AdContentRow, sqlx::Error> {
        let row = sqlx::query_as::<_, AdContentRow>(
            r#"INSERT INTO ad_contents (announcer_address, title, description, link_url, image_url)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, announcer_address, title, description, link_url, image_url, ipfs_hash, created_at, updated_at"#,
        )
        .bind(announcer_address)
        .bind(title)
        .bind(description)
        .bind(link_url)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_contents(&self, announcer: Option<&str>) -> anyhow::Result<Vec<AdContentRow>> {
        let rows = sqlx::query_as::<_, AdContentRow>(
            r#"SELECT id, announcer_address, title, description, link_url, image_url, ipfs_hash, created_at, updated_at
               FROM ad_contents
               WHERE ($1::TEXT IS NULL OR announcer_address = $1)
               ORDER BY created_at DESC"#,
        )
        .bind(announcer)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_content(&self, id: Uuid) -> anyhow::Result<Option<AdContentRow>> {
        let row = sqlx::query_as::<_, AdContentRow>(
            r#"SELECT id, announcer_address, title, description, link_url, image_url, ipfs_hash, created_at, updated_at
               FROM ad_contents WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_content(
        &self,
        id: Uuid,
        title: &str,
        description: &str,
        link_url: &str,
        image_url: &str,
    ) -> anyhow::Result<Option<AdContentRow>> {
        let row = sqlx::query_as::<_, AdContentRow>(
            r#"UPDATE ad_contents
               SET title = $2, description = $3, link_url = $4, image_url = $5, updated_at = NOW()
               WHERE id = $1
               RETURNING id, announcer_address, title, description, link_url, image_url, ipfs_hash, created_at, updated_at"#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(link_url)
        .bind(image_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_content(&self, id: Uuid) -> anyhow::Result<Option<Option<String>>> {
        let hash = sqlx::query_scalar::<_, Option<String>>(
            "DELETE FROM ad_contents WHERE id = $1 RETURNING ipfs_hash",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    pub async fn set_content_ipfs_hash(&self, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE ad_contents SET ipfs_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Ad Event Operations --

    pub async fn insert_event(
        &self,
        parcel_id: i64,
        kind: EventKind,
        meta: &EventMeta,
    ) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO ad_events (parcel_id, kind, ip, country, referer, user_agent, accept_language)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id"#,
        )
        .bind(parcel_id)
        .bind(kind.as_str())
        .bind(&meta.ip)
        .bind(&meta.country)
        .bind(&meta.referer)
        .bind(&meta.user_agent)
        .bind(&meta.accept_language)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Most recent prior click from this IP on this parcel — the lookback
    /// the 24 h de-duplication window is decided against.
    pub async fn last_click_at(
        &self,
        parcel_id: i64,
        ip: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let ts = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"SELECT created_at FROM ad_events
               WHERE parcel_id = $1 AND ip = $2 AND kind = 'click'
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(parcel_id)
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ts)
    }

    pub async fn get_click(&self, click_id: Uuid) -> anyhow::Result<Option<AdEventRow>> {
        let row = sqlx::query_as::<_, AdEventRow>(
            r#"SELECT id, parcel_id, kind, ip, country, referer, user_agent, accept_language, created_at
               FROM ad_events WHERE id = $1 AND kind = 'click'"#,
        )
        .bind(click_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_conversion(
        &self,
        click_id: Uuid,
        parcel_id: i64,
        content_id: Option<Uuid>,
    ) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO conversions (click_id, parcel_id, content_id)
               VALUES ($1, $2, $3)
               RETURNING id"#,
        )
        .bind(click_id)
        .bind(parcel_id)
        .bind(content_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM ad_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -- Analytics Operations --

    pub async fn daily_volume(
        &self,
        parcel_id: i64,
        days: i32,
    ) -> anyhow::Result<Vec<DailyVolumeStat>> {
        let rows = sqlx::query_as::<_, DailyVolumeStat>(
            r#"SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
                      COUNT(*) FILTER (WHERE kind = 'impression') AS impressions,
                      COUNT(*) FILTER (WHERE kind = 'click') AS clicks
               FROM ad_events
               WHERE parcel_id = $1 AND created_at >= NOW() - make_interval(days => $2)
               GROUP BY day
               ORDER BY day ASC"#,
        )
        .bind(parcel_id)
        .bind(days)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn country_breakdown(&self, parcel_id: i64) -> anyhow::Result<Vec<CountryStat>> {
        let rows = sqlx::query_as::<_, CountryStat>(
            r#"SELECT country,
                      COUNT(*) FILTER (WHERE kind = 'impression') AS impressions,
                      COUNT(*) FILTER (WHERE kind = 'click') AS clicks
               FROM ad_events
               WHERE parcel_id = $1
               GROUP BY country
               ORDER BY impressions DESC"#,
        )
        .bind(parcel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn parcel_counts(&self, parcel_id: i64) -> anyhow::Result<ParcelCounts> {
        let counts = sqlx::query_as::<_, ParcelCounts>(
            r#"SELECT COUNT(*) FILTER (WHERE kind = 'impression') AS impressions,
                      COUNT(*) FILTER (WHERE kind = 'click') AS clicks,
                      (SELECT COUNT(*) FROM conversions WHERE parcel_id = $1) AS conversions
               FROM ad_events
               WHERE parcel_id = $1"#,
        )
        .bind(parcel_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    // -- Notification Operations --

    pub async fn insert_notification(
        &self,
        recipient_address: &str,
        kind: &str,
        title: &str,
        body: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO notifications (recipient_address, kind, title, body, metadata)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(recipient_address)
        .bind(kind)
        .bind(title)
        .bind(body)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn list_notifications(
        &self,
        recipient: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<NotificationRow>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"SELECT id, recipient_address, kind, title, body, metadata, is_read, created_at
               FROM notifications
               WHERE recipient_address = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
        )
        .bind(recipient)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_unread(&self, recipient: &str) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_address = $1 AND is_read = FALSE",
        )
        .bind(recipient)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn mark_notification_read(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, recipient: &str) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_address = $1 AND is_read = FALSE",
        )
        .bind(recipient)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -- Agent Decision Operations --

    pub async fn insert_agent_decision(
        &self,
        request_uuid: Uuid,
        parcel_id: Option<i64>,
        action: &str,
        details: Option<serde_json::Value>,
    ) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO agent_decisions (request_uuid, parcel_id, action, details)
               VALUES ($1, $2, $3, $4)
               RETURNING id"#,
        )
        .bind(request_uuid)
        .bind(parcel_id)
        .bind(action)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    // -- Idempotency Key Operations --

    /// Claim a key. The INSERT .. ON CONFLICT DO NOTHING is the atomic step:
    /// of N concurrent callers exactly one sees rows_affected == 1.
    pub async fn try_begin_key(&self, key: Uuid) -> anyhow::Result<Option<Option<String>>> {
        let result = sqlx::query(
            "INSERT INTO idempotency_keys (key, status) VALUES ($1, 'in_progress') ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            // claimed
            return Ok(None);
        }

        // lost the race or the key was seen before — report its status
        let status =
            sqlx::query_scalar::<_, String>("SELECT status FROM idempotency_keys WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(Some(status))
    }

    pub async fn mark_key_done(&self, key: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE idempotency_keys SET status = 'done', completed_at = NOW() WHERE key = $1",
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn release_key(&self, key: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Free in-progress keys left behind by a crash so the caller can retry.
    pub async fn release_stale_keys(&self, older_than_minutes: i32) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"DELETE FROM idempotency_keys
               WHERE status = 'in_progress'
                 AND started_at < NOW() - make_interval(mins => $1)"#,
        )
        .bind(older_than_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Prune completed keys past the replay-protection horizon, bounding
    /// table growth.
    pub async fn prune_done_keys(&self, older_than_days: i32) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"DELETE FROM idempotency_keys
               WHERE status = 'done'
                 AND completed_at < NOW() - make_interval(days => $1)"#,
        )
        .bind(older_than_days)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
