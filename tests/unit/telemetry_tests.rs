use std::time::Instant;

use perfseq_rs::policy::StaticPolicy;
use perfseq_rs::sequencer::{
    ChangeFlags, ChangeInput, ClockList, InMemorySurface, ScriptOutcome, SEQUENCER_VERSION,
    Sequencer, SequencerClient, SequencerError, SequencerInfo, VoltList,
};
use perfseq_rs::types::{CacheGeneration, ClockDomain, PstateIndex, Requester, VoltRail};

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_rig() -> SequencerClient {
        let mut sequencer = Sequencer::new(StaticPolicy::default(), InMemorySurface::new());
        let client = sequencer.client();
        let (mut scripts, reporter) = sequencer.executor_endpoints();
        let _handle = sequencer.spawn();

        tokio::spawn(async move {
            while let Some(_dispatch) = scripts.recv().await {
                reporter
                    .complete(ScriptOutcome::Completed(Default::default()))
                    .await
                    .ok();
            }
        });

        client
    }

    fn make_input() -> ChangeInput {
        let mut clocks = ClockList::new();
        for domain in ClockDomain::ALL {
            clocks.set(domain, 1_000_000);
        }
        let mut voltages = VoltList::new();
        for rail in VoltRail::ALL {
            voltages.set(rail, 800_000, 750_000);
        }
        ChangeInput {
            pstate: PstateIndex(1),
            clocks,
            voltages,
            flags: ChangeFlags::empty(),
            vf_generation: CacheGeneration(0),
            memory_timing: None,
            queued_at: Some(Instant::now()),
        }
    }

    // --- info surface ---

    #[tokio::test]
    async fn test_info_roundtrip() {
        let client = spawn_rig();

        let mut info = client.info().await.unwrap();
        assert_eq!(info.version, SEQUENCER_VERSION);

        info.excluded = perfseq_rs::types::ClockDomainMask::NVD;
        client.set_info(info).await.unwrap();
        assert_eq!(client.info().await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_info_version_mismatch_rejected() {
        let client = spawn_rig();

        let info = SequencerInfo {
            version: SEQUENCER_VERSION + 1,
            ..SequencerInfo::default()
        };
        assert!(matches!(
            client.set_info(info).await,
            Err(SequencerError::InvalidArgument { .. })
        ));
    }

    // --- published record and histogram export ---

    #[tokio::test]
    async fn test_published_record_serializes() {
        let client = spawn_rig();

        let receipt = client
            .queue_change(make_input(), Requester::Driver)
            .await
            .unwrap();
        receipt.completion.unwrap().await.unwrap();

        let published = client.published();
        let value = serde_json::to_value(&published).unwrap();
        assert_eq!(value["state"], "Idle");
        assert_eq!(value["last_completed"]["pstate"], 1);

        let histogram = client.profiling().await.unwrap();
        let value = serde_json::to_value(&histogram).unwrap();
        assert_eq!(value["completed"], 1);
        assert_eq!(value["buckets"].as_array().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_query_snapshot_serializes() {
        let client = spawn_rig();

        let receipt = client
            .queue_change(make_input(), Requester::Driver)
            .await
            .unwrap();
        receipt.completion.unwrap().await.unwrap();

        let snapshot = client.query().await.unwrap();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["header"]["step_count"], 0); // default outcome has no steps
        assert!(value["last_completed"].is_object());
    }
}
