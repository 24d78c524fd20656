use crate::entities::DispatchStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use sqlx::types::Json;
use tollgate_sdk::objects::OrderSettledPayload;
use uuid::Uuid;

/// How long a claimed job stays invisible to other dispatchers.
const CLAIM_LEASE_SECONDS: i64 = 300;

/// A durable "order settled" webhook waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DispatchJobRecord {
    pub id: Uuid,
    pub payload: Json<OrderSettledPayload>,
    pub notify_url: String,
    pub status: DispatchStatus,
    pub attempts: i32,
    pub max_retry: i32,
    pub next_attempt_at: time::OffsetDateTime,
    pub last_error: Option<String>,
    pub created_at: time::OffsetDateTime,
}

/// Data for enqueueing a new dispatch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDispatchJob {
    pub id: Uuid,
    pub payload: OrderSettledPayload,
    pub notify_url: String,
    pub max_retry: u32,
}

impl NewDispatchJob {
    pub fn new(payload: OrderSettledPayload, notify_url: String, max_retry: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            payload,
            notify_url,
            max_retry,
        }
    }
}

impl NewDispatchJob {
    /// Insert the job on `executor`, so it can share a settlement transaction.
    #[tracing::instrument(skip_all, err, name = "SQL:InsertDispatchJob")]
    pub async fn insert<'e>(self, executor: impl sqlx::PgExecutor<'e>) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            INSERT INTO dispatch_jobs (id, payload, notify_url, status, attempts, max_retry, next_attempt_at)
            VALUES ($1, $2, $3, 'queued', 0, $4, NOW())
            "#,
            self.id,
            Json(self.payload) as _,
            self.notify_url,
            self.max_retry as i32,
        )
        .execute(executor)
        .await?;
        Ok(())
    }
}

impl Processor<NewDispatchJob> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    async fn process(&self, job: NewDispatchJob) -> Result<(), sqlx::Error> {
        job.insert(&self.pool).await
    }
}

#[derive(Debug, Clone)]
/// Claim up to `limit` queued jobs whose next attempt is due.
///
/// Claimed rows have their `next_attempt_at` pushed forward by a lease so a
/// concurrent dispatcher does not pick them up while delivery is in flight.
pub struct ClaimDueDispatchJobs {
    pub limit: u32,
}

impl Processor<ClaimDueDispatchJobs> for DatabaseProcessor {
    type Output = Vec<DispatchJobRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ClaimDueDispatchJobs")]
    async fn process(
        &self,
        query: ClaimDueDispatchJobs,
    ) -> Result<Vec<DispatchJobRecord>, sqlx::Error> {
        let jobs = sqlx::query_as!(
            DispatchJobRecord,
            r#"
            UPDATE dispatch_jobs
            SET next_attempt_at = NOW() + make_interval(secs => $2)
            WHERE id IN (
                SELECT id FROM dispatch_jobs
                WHERE status = 'queued' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING
                id,
                payload as "payload!: Json<OrderSettledPayload>",
                notify_url,
                status as "status!: DispatchStatus",
                attempts,
                max_retry,
                next_attempt_at,
                last_error,
                created_at
            "#,
            i64::from(query.limit),
            CLAIM_LEASE_SECONDS as f64,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }
}

#[derive(Debug, Clone)]
/// Mark a job as delivered.
pub struct MarkDispatchDelivered {
    pub id: Uuid,
}

impl Processor<MarkDispatchDelivered> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkDispatchDelivered")]
    async fn process(&self, cmd: MarkDispatchDelivered) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            UPDATE dispatch_jobs
            SET status = 'delivered', attempts = attempts + 1, last_error = NULL
            WHERE id = $1
            "#,
            cmd.id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Record a failed attempt and schedule the next one.
pub struct RescheduleDispatchJob {
    pub id: Uuid,
    pub attempts: u32,
    pub next_attempt_at: time::OffsetDateTime,
    pub error: String,
}

impl Processor<RescheduleDispatchJob> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RescheduleDispatchJob")]
    async fn process(&self, cmd: RescheduleDispatchJob) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            UPDATE dispatch_jobs
            SET attempts = $2, next_attempt_at = $3, last_error = $4
            WHERE id = $1
            "#,
            cmd.id,
            cmd.attempts as i32,
            cmd.next_attempt_at,
            cmd.error,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Give up on a job after its retry budget is exhausted.
pub struct BuryDispatchJob {
    pub id: Uuid,
    pub attempts: u32,
    pub error: String,
}

impl Processor<BuryDispatchJob> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:BuryDispatchJob")]
    async fn process(&self, cmd: BuryDispatchJob) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            UPDATE dispatch_jobs
            SET status = 'dead', attempts = $2, last_error = $3
            WHERE id = $1
            "#,
            cmd.id,
            cmd.attempts as i32,
            cmd.error,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
