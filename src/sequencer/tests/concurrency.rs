/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Tests for concurrent submission from multiple producer tasks.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::sequencer::tests::harness::{auto_rig, full_input};
    use crate::types::Requester;

    #[tokio::test]
    async fn test_concurrent_submissions_are_serialized() {
        let (client, _policy) = auto_rig();

        // Five producers, each with one synchronous request outstanding
        // at a time, stay well inside the fixed waiter table.
        let mut handles = Vec::new();
        for _ in 0..5 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let mut sequences = Vec::new();
                for _ in 0..20 {
                    let receipt = client
                        .queue_change(full_input(), Requester::Driver)
                        .await
                        .unwrap();
                    let completed = receipt.completion.unwrap().await.unwrap();
                    assert!(receipt.sequence.is_at_or_before(completed));
                    sequences.push(receipt.sequence.0);
                }
                sequences
            }));
        }

        let mut all = BTreeSet::new();
        for handle in handles {
            for sequence in handle.await.unwrap() {
                assert!(all.insert(sequence), "duplicate sequence id {sequence}");
            }
        }
        assert_eq!(all.len(), 100);
        assert_eq!(all.iter().next_back(), Some(&100));

        let histogram = client.profiling().await.unwrap();
        assert_eq!(histogram.completed, 0); // no start timestamps supplied
    }

    #[tokio::test]
    async fn test_every_sync_caller_is_woken() {
        let (client, _policy) = auto_rig();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let receipt = client
                    .queue_change(full_input(), Requester::VoltController)
                    .await
                    .unwrap();
                receipt.completion.unwrap().await.unwrap()
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        // All four completed and the waiter slots were recycled.
        let published = client.published().last_completed.unwrap();
        assert_eq!(published.sequence.0, 4);
    }
}
