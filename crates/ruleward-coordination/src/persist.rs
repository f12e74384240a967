//! JSON encoding of allocator state in the key-value store.

use ruleward_kv::BatchOperation;
use ruleward_kv::KeyValueStore;
use ruleward_kv::KeyValueStoreError;
use ruleward_kv::ReadRequest;
use ruleward_kv::WriteRequest;
use ruleward_rules::RuleId;
use serde::de::DeserializeOwned;

use crate::error::RuleIdError;
use crate::feature::Feature;
use crate::keys::host_index_key;
use crate::types::HostIndex;

/// Read and decode `key`. `None` if the key is absent.
pub(crate) async fn read_json<S, T>(store: &S, key: &str) -> Result<Option<T>, RuleIdError>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let value = match store.read(ReadRequest::new(key)).await {
        Ok(result) => match result.kv {
            Some(kv) => kv.value,
            None => return Ok(None),
        },
        Err(KeyValueStoreError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(RuleIdError::Storage { source: e }),
    };

    serde_json::from_str(&value).map(Some).map_err(|e| RuleIdError::CorruptedData {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Batch operation storing `ids` under `key`, or deleting the key when empty.
pub(crate) fn ids_operation(key: String, ids: &[RuleId]) -> Result<BatchOperation, RuleIdError> {
    if ids.is_empty() {
        return Ok(BatchOperation::Delete { key });
    }
    Ok(BatchOperation::Set {
        key,
        value: serde_json::to_string(ids)?,
    })
}

pub(crate) async fn read_host_index<S>(store: &S, feature: Feature) -> Result<HostIndex, RuleIdError>
where S: KeyValueStore + ?Sized {
    Ok(read_json(store, &host_index_key(feature)).await?.unwrap_or_default())
}

pub(crate) async fn write_host_index<S>(store: &S, feature: Feature, index: &HostIndex) -> Result<(), RuleIdError>
where S: KeyValueStore + ?Sized {
    let key = host_index_key(feature);
    let operation = if index.is_empty() {
        BatchOperation::Delete { key }
    } else {
        BatchOperation::Set {
            key,
            value: serde_json::to_string(index)?,
        }
    };
    store.write(WriteRequest::batch(vec![operation])).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use ruleward_kv::DeterministicKeyValueStore;

    use super::*;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let store = DeterministicKeyValueStore::new();
        let value: Option<Vec<RuleId>> = read_json(&*store, "activeRuleIds:lockout").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn garbage_is_reported_as_corruption() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("activeRuleIds:lockout", "[1,")).await.unwrap();
        let err = read_json::<_, Vec<RuleId>>(&*store, "activeRuleIds:lockout").await.unwrap_err();
        assert!(matches!(err, RuleIdError::CorruptedData { key, .. } if key == "activeRuleIds:lockout"));
    }

    #[test]
    fn empty_ids_delete_the_key() {
        assert_eq!(ids_operation("k".into(), &[]).unwrap(), BatchOperation::Delete { key: "k".into() });
        assert_eq!(ids_operation("k".into(), &[2, 1]).unwrap(), BatchOperation::Set {
            key: "k".into(),
            value: "[2,1]".into()
        });
    }

    #[tokio::test]
    async fn host_index_round_trip() {
        let store = DeterministicKeyValueStore::new();
        let index = HostIndex::from([("a.com".to_string(), 10_000)]);
        write_host_index(&*store, Feature::Lockout, &index).await.unwrap();
        assert_eq!(read_host_index(&*store, Feature::Lockout).await.unwrap(), index);

        write_host_index(&*store, Feature::Lockout, &HostIndex::new()).await.unwrap();
        assert!(store.dump().await.is_empty());
    }
}
