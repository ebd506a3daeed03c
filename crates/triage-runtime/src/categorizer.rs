//! Hierarchical tree-descent categorisation.
//!
//! The categorizer walks the category tree level by level. Each visited level
//! costs one oracle call; matched nodes with children are refined by
//! descending into them, and a matched node is kept itself when none of its
//! children match. Progress records are published per matched level and the
//! run always ends with one final record.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, info, warn};

use triage_core::{
    CategoryNode, CategorySource, CategoryTree, ClassificationOracle, RunContext, StreamRecordId,
};

use crate::error::WorkflowError;
use crate::records::CategorizationRecord;
use crate::sink::StreamSink;

/// Result of one categorisation run.
#[derive(Debug, Clone)]
pub struct CategorizationOutcome {
    /// Most specific matching categories in descent order.
    pub categories: Vec<CategoryNode>,
    pub oracle_calls: usize,
    /// Id of the final record, when one was published.
    pub final_record: Option<StreamRecordId>,
}

impl CategorizationOutcome {
    pub fn slugs(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.slug.clone()).collect()
    }
}

/// Tree-descent engine.
pub struct Categorizer {
    oracle: Arc<dyn ClassificationOracle>,
    sink: Option<StreamSink>,
}

impl Categorizer {
    pub fn new(oracle: Arc<dyn ClassificationOracle>) -> Self {
        Self { oracle, sink: None }
    }

    /// Publish progress and final records to `sink`.
    pub fn with_sink(mut self, sink: StreamSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Load the tree stored under `key` and categorise against it.
    ///
    /// Nothing is published when the tree cannot be loaded.
    pub async fn categorize_from_source(
        &self,
        source: &dyn CategorySource,
        key: &str,
        title: &str,
        description: &str,
        ctx: &RunContext,
    ) -> Result<CategorizationOutcome, WorkflowError> {
        let tree = CategoryTree::load(source, key).await.map_err(|err| {
            warn!(cache_key = key, error = %err, "category tree unavailable");
            WorkflowError::Retrieval(err)
        })?;
        self.categorize(title, description, &tree, ctx).await
    }

    pub async fn categorize(
        &self,
        title: &str,
        description: &str,
        tree: &CategoryTree,
        ctx: &RunContext,
    ) -> Result<CategorizationOutcome, WorkflowError> {
        info!(
            nodes = tree.len(),
            height = tree.height(),
            "starting categorization"
        );
        let descent = Descent {
            categorizer: self,
            tree,
            title,
            description,
            ctx,
            oracle_calls: AtomicUsize::new(0),
        };
        let leaves = descent.level(tree.roots(), 0).await;
        let categories: Vec<CategoryNode> = leaves.into_iter().cloned().collect();
        let oracle_calls = descent.oracle_calls.load(Ordering::Relaxed);

        let slugs: Vec<String> = categories.iter().map(|c| c.slug.clone()).collect();
        info!(
            categories = ?slugs,
            oracle_calls,
            "categorization finished"
        );

        let final_record = match (&self.sink, ctx.report_id.as_deref()) {
            (Some(sink), Some(report_id)) => {
                let record = CategorizationRecord::new(report_id, slugs, true, ctx);
                let id = sink.publish(&record).await.map_err(|err| {
                    warn!(stream = sink.name(), error = %err, "final record not published");
                    err
                })?;
                debug!(stream = sink.name(), record_id = %id, "final record published");
                Some(id)
            }
            _ => None,
        };

        Ok(CategorizationOutcome {
            categories,
            oracle_calls,
            final_record,
        })
    }

    /// Progress failures are logged and the descent carries on.
    async fn publish_progress(&self, ctx: &RunContext, depth: usize, matched: &[&CategoryNode]) {
        let (Some(sink), Some(report_id)) = (&self.sink, ctx.report_id.as_deref()) else {
            return;
        };
        let slugs = matched.iter().map(|n| n.slug.clone()).collect();
        let record = CategorizationRecord::new(report_id, slugs, false, ctx);
        match sink.publish(&record).await {
            Ok(id) => debug!(stream = sink.name(), depth, record_id = %id, "progress published"),
            Err(err) => warn!(stream = sink.name(), depth, error = %err, "progress record lost"),
        }
    }
}

/// State of one run's recursion.
struct Descent<'a> {
    categorizer: &'a Categorizer,
    tree: &'a CategoryTree,
    title: &'a str,
    description: &'a str,
    ctx: &'a RunContext,
    oracle_calls: AtomicUsize,
}

impl<'a> Descent<'a> {
    fn level(
        &'a self,
        candidates: Vec<&'a CategoryNode>,
        depth: usize,
    ) -> BoxFuture<'a, Vec<&'a CategoryNode>> {
        async move {
            if candidates.is_empty() {
                return Vec::new();
            }
            debug!(depth, candidates = candidates.len(), "classifying level");
            self.oracle_calls.fetch_add(1, Ordering::Relaxed);

            let mut decision = match self
                .categorizer
                .oracle
                .classify(self.title, self.description, &candidates)
                .await
            {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(depth, error = %err, "oracle failed; branch treated as unmatched");
                    return Vec::new();
                }
            };
            let unknown = decision.retain_candidates(&candidates);
            if !unknown.is_empty() {
                warn!(depth, unknown = ?unknown, "oracle returned ids outside the candidates");
            }

            let matched: Vec<&'a CategoryNode> = candidates
                .iter()
                .copied()
                .filter(|node| decision.contains(node.id))
                .collect();
            if matched.is_empty() {
                debug!(depth, "no match at this level");
                return Vec::new();
            }

            self.categorizer
                .publish_progress(self.ctx, depth, &matched)
                .await;

            let mut leaves = Vec::new();
            for node in matched {
                if !node.has_children() {
                    leaves.push(node);
                    continue;
                }
                let refined = self.level(self.tree.children(node), depth + 1).await;
                if refined.is_empty() {
                    debug!(depth, category = %node.slug, "children unmatched, keeping parent");
                    leaves.push(node);
                } else {
                    leaves.extend(refined);
                }
            }
            leaves
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use triage_core::codec::decode;
    use triage_core::{DurableStream, TreeError};
    use triage_stores::{InMemoryCategorySource, InMemoryDurableStream};

    use crate::testing::{FlakyStream, ScriptedOracle, TREE_JSON};

    const STREAM: &str = "reports:light-categorization";

    fn tree() -> CategoryTree {
        CategoryTree::from_json(TREE_JSON).unwrap()
    }

    fn categorizer(oracle: ScriptedOracle, stream: Arc<dyn DurableStream>) -> Categorizer {
        Categorizer::new(Arc::new(oracle)).with_sink(StreamSink::new(stream, STREAM))
    }

    async fn published(stream: &dyn DurableStream) -> Vec<serde_json::Map<String, Value>> {
        stream
            .range(STREAM, None)
            .await
            .unwrap()
            .iter()
            .map(|r| decode(&r.fields))
            .collect()
    }

    #[test]
    fn test_descends_to_most_specific_match() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            let oracle = ScriptedOracle::new()
                .answer(&[1, 2], &[1])
                .answer(&[11, 12], &[11]);
            let ctx = RunContext::for_report("r-1").with_correlation_id(Some("c-1".to_string()));

            let outcome = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &ctx)
                .await
                .unwrap();

            assert_eq!(outcome.slugs(), vec!["a1"]);
            assert_eq!(outcome.oracle_calls, 2);

            let records = published(stream.as_ref()).await;
            assert_eq!(records.len(), 3);
            assert_eq!(records[0]["recognized_categories"], json!(["a"]));
            assert_eq!(records[0]["is_final"], false);
            assert_eq!(records[1]["recognized_categories"], json!(["a1"]));
            assert_eq!(records[1]["is_final"], false);
            assert_eq!(records[2]["recognized_categories"], json!(["a1"]));
            assert_eq!(records[2]["is_final"], true);
            assert_eq!(records[2]["report_id"], "r-1");
            assert_eq!(records[2]["correlation_id"], "c-1");

            let final_id = outcome.final_record.unwrap();
            let last = stream.range(STREAM, None).await.unwrap().pop().unwrap();
            assert_eq!(last.id, final_id);
        });
    }

    #[test]
    fn test_no_root_match_emits_single_empty_final() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            let outcome = categorizer(ScriptedOracle::new(), stream.clone())
                .categorize("t", "d", &tree(), &RunContext::for_report("r-2"))
                .await
                .unwrap();

            assert!(outcome.categories.is_empty());
            let records = published(stream.as_ref()).await;
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["recognized_categories"], json!([]));
            assert_eq!(records[0]["is_final"], true);
            assert!(records[0].get("correlation_id").is_none());
        });
    }

    #[test]
    fn test_parent_kept_when_children_do_not_refine() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            let oracle = ScriptedOracle::new().answer(&[1, 2], &[1]);

            let outcome = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &RunContext::for_report("r-3"))
                .await
                .unwrap();

            assert_eq!(outcome.slugs(), vec!["a"]);
            assert_eq!(outcome.oracle_calls, 2);
            let records = published(stream.as_ref()).await;
            assert_eq!(records.len(), 2);
            assert_eq!(records[1]["recognized_categories"], json!(["a"]));
        });
    }

    #[test]
    fn test_oracle_failure_only_aborts_its_branch() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            let oracle = ScriptedOracle::new()
                .answer(&[1, 2], &[1, 2])
                .fail(&[11, 12], "model timed out");

            let outcome = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &RunContext::for_report("r-4"))
                .await
                .unwrap();

            assert_eq!(outcome.slugs(), vec!["a", "b"]);
            let records = published(stream.as_ref()).await;
            assert_eq!(records.last().unwrap()["is_final"], true);
        });
    }

    #[test]
    fn test_root_oracle_failure_still_publishes_final() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            let oracle = ScriptedOracle::new().fail(&[1, 2], "connection refused");

            let outcome = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &RunContext::for_report("r-5"))
                .await
                .unwrap();

            assert!(outcome.categories.is_empty());
            assert!(outcome.final_record.is_some());
            assert_eq!(stream.len(STREAM).await.unwrap(), 1);
        });
    }

    #[test]
    fn test_ids_outside_candidates_are_dropped() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            // 11 is a real node but not a root candidate; 99 does not exist
            let oracle = ScriptedOracle::new().answer(&[1, 2], &[2, 11, 99]);

            let outcome = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &RunContext::for_report("r-6"))
                .await
                .unwrap();

            assert_eq!(outcome.slugs(), vec!["b"]);
            let records = published(stream.as_ref()).await;
            assert_eq!(records[0]["recognized_categories"], json!(["b"]));
        });
    }

    #[test]
    fn test_each_node_visited_once_in_candidate_order() {
        tokio_test::block_on(async {
            let oracle = Arc::new(
                ScriptedOracle::new()
                    .answer(&[1, 2], &[2, 1])
                    .answer(&[11, 12], &[12, 11]),
            );
            let outcome = Categorizer::new(oracle.clone())
                .categorize("t", "d", &tree(), &RunContext::default())
                .await
                .unwrap();

            assert_eq!(outcome.slugs(), vec!["a1", "a2", "b"]);
            assert_eq!(oracle.calls(), vec![vec![1, 2], vec![11, 12]]);
            assert_eq!(outcome.final_record, None);
        });
    }

    #[test]
    fn test_without_report_id_nothing_is_published() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            let oracle = ScriptedOracle::new().answer(&[1, 2], &[2]);

            let outcome = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &RunContext::default())
                .await
                .unwrap();

            assert_eq!(outcome.slugs(), vec!["b"]);
            assert_eq!(stream.len(STREAM).await.unwrap(), 0);
        });
    }

    #[test]
    fn test_lost_progress_does_not_stop_the_run() {
        tokio_test::block_on(async {
            let stream = FlakyStream::failing_progress();
            let oracle = ScriptedOracle::new()
                .answer(&[1, 2], &[1])
                .answer(&[11, 12], &[12]);

            let outcome = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &RunContext::for_report("r-7"))
                .await
                .unwrap();

            assert_eq!(outcome.slugs(), vec!["a2"]);
            let records = published(stream.as_ref()).await;
            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["is_final"], true);
        });
    }

    #[test]
    fn test_final_append_failure_fails_the_run() {
        tokio_test::block_on(async {
            let stream = FlakyStream::failing_final();
            let oracle = ScriptedOracle::new().answer(&[1, 2], &[2]);

            let result = categorizer(oracle, stream.clone())
                .categorize("t", "d", &tree(), &RunContext::for_report("r-8"))
                .await;

            assert!(matches!(result, Err(WorkflowError::Stream(_))));
            // the progress record made it
            assert_eq!(stream.len(STREAM).await.unwrap(), 1);
        });
    }

    #[test]
    fn test_missing_tree_is_retrieval_error_and_publishes_nothing() {
        tokio_test::block_on(async {
            let stream = Arc::new(InMemoryDurableStream::new());
            let source = InMemoryCategorySource::new();

            let result = categorizer(ScriptedOracle::new(), stream.clone())
                .categorize_from_source(
                    &source,
                    "categories:tree",
                    "t",
                    "d",
                    &RunContext::for_report("r-9"),
                )
                .await;

            assert!(matches!(
                result,
                Err(WorkflowError::Retrieval(TreeError::NotFound(_)))
            ));
            assert_eq!(stream.len(STREAM).await.unwrap(), 0);
        });
    }

    #[test]
    fn test_corrupt_tree_is_retrieval_error() {
        tokio_test::block_on(async {
            let source = InMemoryCategorySource::with_entry("categories:tree", "{not json");
            let result = Categorizer::new(Arc::new(ScriptedOracle::new()))
                .categorize_from_source(&source, "categories:tree", "t", "d", &RunContext::default())
                .await;
            assert!(matches!(
                result,
                Err(WorkflowError::Retrieval(TreeError::CorruptData(_)))
            ));
        });
    }
}
