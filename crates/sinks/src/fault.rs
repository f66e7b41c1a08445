use std::sync::Arc;

use analitica_core::{
    ObjectSink, ObjectVersion, PutObject, SinkError, SinkResult, StoredObject,
};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Sink wrapper that refuses writes to chosen keys and records every
/// write it forwards. Reads and deletes pass straight through.
pub struct FaultySink {
    inner: Arc<dyn ObjectSink>,
    denied: Mutex<Vec<String>>,
    written: Mutex<Vec<String>>,
}

impl FaultySink {
    pub fn new(inner: Arc<dyn ObjectSink>) -> Self {
        Self {
            inner,
            denied: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
        }
    }

    /// Fail every write whose key ends with `suffix`.
    pub fn deny_writes_to(self, suffix: &str) -> Self {
        self.denied.lock().push(suffix.to_owned());
        self
    }

    /// Keys written successfully, in order.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    fn check(&self, key: &str) -> SinkResult<()> {
        if self.denied.lock().iter().any(|s| key.ends_with(s.as_str())) {
            return Err(SinkError::Permission {
                details: format!("write to {key} denied").into(),
            });
        }
        Ok(())
    }

    fn record(&self, key: String) {
        self.written.lock().push(key);
    }
}

#[async_trait]
impl ObjectSink for FaultySink {
    fn container(&self) -> &str {
        self.inner.container()
    }

    async fn put_object(&self, object: PutObject) -> SinkResult<()> {
        self.check(&object.key)?;
        let key = object.key.clone();
        self.inner.put_object(object).await?;
        self.record(key);
        Ok(())
    }

    async fn put_object_if_absent(
        &self,
        object: PutObject,
    ) -> SinkResult<bool> {
        self.check(&object.key)?;
        let key = object.key.clone();
        let written = self.inner.put_object_if_absent(object).await?;
        if written {
            self.record(key);
        }
        Ok(written)
    }

    async fn put_object_if_match(
        &self,
        object: PutObject,
        expected: &ObjectVersion,
    ) -> SinkResult<bool> {
        self.check(&object.key)?;
        let key = object.key.clone();
        let written = self.inner.put_object_if_match(object, expected).await?;
        if written {
            self.record(key);
        }
        Ok(written)
    }

    async fn get_object(
        &self,
        key: &str,
    ) -> SinkResult<Option<StoredObject>> {
        self.inner.get_object(key).await
    }

    async fn delete_object(&self, key: &str) -> SinkResult<()> {
        self.inner.delete_object(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectStoreSink;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn object(key: &str) -> PutObject {
        PutObject {
            key: key.into(),
            body: Bytes::from_static(b"x"),
            content_type: "text/plain".into(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn denied_suffix_fails_and_others_pass() {
        let inner = Arc::new(ObjectStoreSink::in_memory("bucket"));
        let sink = FaultySink::new(inner.clone()).deny_writes_to("/t.jsonl");

        sink.put_object(object("history/t/ts/t.jsonl.bak")).await.unwrap();
        let err = sink.put_object(object("t/t.jsonl")).await.unwrap_err();
        assert!(matches!(err, SinkError::Permission { .. }), "{err}");

        assert_eq!(sink.written(), vec!["history/t/ts/t.jsonl.bak".to_owned()]);
        assert!(inner.get_object("t/t.jsonl").await.unwrap().is_none());
    }
}
