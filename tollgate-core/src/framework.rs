use sqlx::PgPool;

/// Executes database commands and queries.
///
/// Each query or command is a plain struct; its SQL lives in a
/// `kanau::processor::Processor` impl on this type next to the entity it
/// touches.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
