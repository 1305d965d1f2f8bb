//! Dealer registry: a `dealers` list key on the registry identity, plus the
//! table listings read from each dealer's own identity.

use serde::{Deserialize, Serialize};

use crate::vdxf::{keys, IdentityStore, VdxfError};

use super::DealerError;

const LOG_TARGET: &str = "dealer::registry";

/// Short name of the registry identity.
pub const DEALERS_ID: &str = "dealers";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DealerRegistry {
    pub dealers: Vec<String>,
}

pub async fn list_dealers(store: &IdentityStore) -> Result<DealerRegistry, VdxfError> {
    let registry_fqn = store.namespace().qualify(DEALERS_ID);
    Ok(store
        .read_latest(&registry_fqn, keys::DEALERS, None, 0)
        .await?
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

pub async fn is_dealer_registered(
    store: &IdentityStore,
    dealer_id: &str,
) -> Result<bool, VdxfError> {
    let registry = list_dealers(store).await?;
    Ok(registry.dealers.iter().any(|d| d == dealer_id))
}

pub async fn add_dealer(store: &IdentityStore, dealer_id: &str) -> Result<(), DealerError> {
    let chain = store.chain();
    let dealer_fqn = store.namespace().qualify(dealer_id);
    if !chain.identity_exists(&dealer_fqn).await? {
        return Err(DealerError::CannotSign(dealer_fqn));
    }
    let registry_fqn = store.namespace().qualify(DEALERS_ID);
    if !chain.can_sign_for(&registry_fqn).await? {
        return Err(DealerError::CannotSign(registry_fqn));
    }

    let mut registry = list_dealers(store).await?;
    if registry.dealers.iter().any(|d| d == dealer_id) {
        tracing::info!(target: LOG_TARGET, %dealer_id, "dealer already registered");
        return Ok(());
    }
    registry.dealers.push(dealer_id.to_string());
    store
        .append_json(
            &registry_fqn,
            keys::DEALERS,
            None,
            &serde_json::to_value(&registry).expect("registry serializes"),
        )
        .await?;
    tracing::info!(target: LOG_TARGET, %dealer_id, "dealer registered");
    Ok(())
}

/// Tables currently advertised by registered dealers.
pub async fn list_tables(
    store: &IdentityStore,
) -> Result<Vec<crate::game::types::TableInfo>, VdxfError> {
    let registry = list_dealers(store).await?;
    let mut tables = Vec::new();
    for dealer_id in &registry.dealers {
        let dealer_fqn = store.namespace().qualify(dealer_id);
        if let Some(table) = store
            .read_latest(&dealer_fqn, keys::T_TABLE_INFO, None, 0)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
        {
            tables.push(table);
        }
    }
    Ok(tables)
}
