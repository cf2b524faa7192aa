use perfseq_rs::policy::StaticPolicy;
use perfseq_rs::sequencer::{
    ChangeFlags, ChangeInput, ClockList, InMemorySurface, LockStatus, ScriptOutcome, Sequencer,
    SequencerClient, SequencerError, VoltList,
};
use perfseq_rs::types::{CacheGeneration, ClockDomain, ClockDomainMask, PstateIndex, Requester, VoltRail};

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

    fn full_clocks() -> ClockList {
        let mut clocks = ClockList::new();
        for domain in ClockDomain::ALL {
            clocks.set(domain, 1_000_000);
        }
        clocks
    }

    fn full_voltages() -> VoltList {
        let mut voltages = VoltList::new();
        for rail in VoltRail::ALL {
            voltages.set(rail, 800_000, 750_000);
        }
        voltages
    }

    fn make_input() -> ChangeInput {
        ChangeInput {
            pstate: PstateIndex(1),
            clocks: full_clocks(),
            voltages: full_voltages(),
            flags: ChangeFlags::ASYNC,
            vf_generation: CacheGeneration(0),
            memory_timing: None,
            queued_at: None,
        }
    }

    // --- pstate validation ---

    #[tokio::test]
    async fn test_invalid_pstate_rejected() {
        let client = spawn_rig();
        let mut input = make_input();
        input.pstate = PstateIndex::INVALID;

        let result = client.queue_change(input, Requester::Driver).await;
        assert!(matches!(
            result,
            Err(SequencerError::InvalidArgument { .. })
        ));
    }

    // --- clock mask algebra ---

    #[tokio::test]
    async fn test_missing_programmable_domain_rejected() {
        let client = spawn_rig();
        let mut input = make_input();
        let mut clocks = ClockList::new();
        for domain in ClockDomain::ALL {
            if domain != ClockDomain::Mclk {
                clocks.set(domain, 1_000_000);
            }
        }
        input.clocks = clocks;

        let result = client.queue_change(input, Requester::Driver).await;
        assert!(matches!(
            result,
            Err(SequencerError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_excluded_domain_may_be_omitted() {
        let client = spawn_rig();

        // Exclude MCLK under the lock, then omit it from the request.
        assert_eq!(client.lock().await.unwrap(), LockStatus::Acquired);
        client
            .set_control(ClockDomainMask::MCLK, ClockDomainMask::empty())
            .await
            .unwrap();
        client.unlock().await.unwrap();

        let mut input = make_input();
        let mut clocks = ClockList::new();
        for domain in ClockDomain::ALL {
            if domain != ClockDomain::Mclk {
                clocks.set(domain, 1_000_000);
            }
        }
        input.clocks = clocks;

        assert!(client.queue_change(input, Requester::Driver).await.is_ok());
    }

    #[tokio::test]
    async fn test_oversupplying_domains_is_allowed() {
        let client = spawn_rig();

        // Exclude DISP but still supply it: supersets are fine.
        assert_eq!(client.lock().await.unwrap(), LockStatus::Acquired);
        client
            .set_control(ClockDomainMask::DISP, ClockDomainMask::empty())
            .await
            .unwrap();
        client.unlock().await.unwrap();

        assert!(
            client
                .queue_change(make_input(), Requester::Driver)
                .await
                .is_ok()
        );
    }

    // --- voltage mask validation ---

    #[tokio::test]
    async fn test_partial_rail_coverage_rejected() {
        let client = spawn_rig();
        let mut input = make_input();
        let mut voltages = VoltList::new();
        voltages.set(VoltRail::Logic, 800_000, 750_000);
        input.voltages = voltages;

        let result = client.queue_change(input, Requester::Driver).await;
        assert!(matches!(
            result,
            Err(SequencerError::InvalidArgument { .. })
        ));
    }

    // --- waiter capacity ---

    #[tokio::test]
    async fn test_waiter_table_capacity_is_a_hard_error() {
        let client = spawn_rig();

        // Hold the lock so nothing completes and waiters accumulate.
        client.lock().await.unwrap();

        let mut receipts = Vec::new();
        for _ in 0..8 {
            let mut input = make_input();
            input.flags = ChangeFlags::empty();
            receipts.push(
                client
                    .queue_change(input, Requester::Driver)
                    .await
                    .unwrap(),
            );
        }

        let mut input = make_input();
        input.flags = ChangeFlags::empty();
        let overflow = client.queue_change(input, Requester::Driver).await;
        assert!(matches!(overflow, Err(SequencerError::WaiterTableFull)));

        // Releasing the lock runs the surviving pending request, whose
        // completion covers every accumulated waiter.
        client.unlock().await.unwrap();
        for receipt in receipts {
            receipt.completion.unwrap().await.unwrap();
        }
    }
}
