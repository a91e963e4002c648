//! Property test: replicas converge after arbitrary concurrent edits.

use docsync_core::LocalStore;
use docsync_protocol::{Document, DocumentId, Revision};
use docsync_sync_engine::{NetworkMonitor, SyncConfig, SyncEngine};
use docsync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn apply(store: &LocalStore, edit: &Edit) {
    let docs = store.all_docs();
    match edit {
        Edit::Create(_, fields) => {
            store.put(Document::submission(fields.clone())).unwrap();
        }
        Edit::Update(_, n, fields) if !docs.is_empty() => {
            let mut doc = docs[n % docs.len()].clone();
            doc.fields = fields.clone();
            doc.touch();
            store.put(doc).unwrap();
        }
        Edit::Delete(_, n) if !docs.is_empty() => {
            let doc = &docs[n % docs.len()];
            store.remove(&doc.id, doc.revision.as_ref()).unwrap();
        }
        _ => {}
    }
}

fn winners(store: &LocalStore, ids: &BTreeSet<DocumentId>) -> BTreeMap<DocumentId, Option<Revision>> {
    ids.iter()
        .map(|id| (id.clone(), store.get(id).and_then(|doc| doc.revision)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn replicas_converge(script in edit_script_strategy(24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let stores = TestStores::memory();
            let engine = SyncEngine::new(
                Arc::clone(&stores.local),
                stores.remote.clone(),
                NetworkMonitor::default(),
                SyncConfig::new().with_batch_size(3),
            );

            for (step, edit) in script.iter().enumerate() {
                match edit {
                    Edit::Create(Side::Local, _)
                    | Edit::Update(Side::Local, ..)
                    | Edit::Delete(Side::Local, _) => apply(&stores.local, edit),
                    _ => apply(stores.remote.store(), edit),
                }
                if step % 4 == 3 {
                    engine.replicate_once().await.unwrap();
                }
            }

            engine.replicate_once().await.unwrap();
            let settle = engine.replicate_once().await.unwrap();
            prop_assert_eq!(settle.total(), 0);

            let ids: BTreeSet<DocumentId> = stores
                .local
                .all_docs()
                .into_iter()
                .chain(stores.remote.store().all_docs())
                .map(|doc| doc.id)
                .collect();
            prop_assert_eq!(
                winners(&stores.local, &ids),
                winners(stores.remote.store(), &ids)
            );
            prop_assert_eq!(stores.local.document_count(), stores.remote.store().document_count());
            Ok(())
        })?;
    }
}
