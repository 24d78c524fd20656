use crate::entities::ChainName;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A receiving wallet in the pool.
///
/// `locked` is set while the wallet is assigned to an unsettled order; it is
/// managed by the order lifecycle, never by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WalletAddress {
    pub chain: ChainName,
    pub address: String,
    pub locked: bool,
}

#[derive(Debug, Clone)]
/// List the addresses currently awaiting payment on a chain.
pub struct ListLockedWallets {
    pub chain: ChainName,
}

impl Processor<ListLockedWallets> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListLockedWallets")]
    async fn process(&self, query: ListLockedWallets) -> Result<Vec<String>, sqlx::Error> {
        let wallets = sqlx::query_as!(
            WalletAddress,
            r#"
            SELECT chain as "chain!: ChainName", address, locked
            FROM wallet_addresses
            WHERE chain = $1 AND locked = true
            ORDER BY address
            "#,
            query.chain as ChainName,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(wallets.into_iter().map(|w| w.address).collect())
    }
}
