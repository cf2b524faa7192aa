/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Tests for the lock/unlock protocol and lock fairness.

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use crate::sequencer::tests::harness::{async_input, executed_steps, full_input, manual_rig};
    use crate::sequencer::{
        EventKind, LockStatus, ScriptOutcome, SeqState, SequencerError,
    };
    use crate::types::{ClockDomainMask, Requester};

    #[tokio::test]
    async fn test_lock_while_idle_is_immediate() {
        let rig = manual_rig();
        assert_eq!(rig.client.lock().await.unwrap(), LockStatus::Acquired);
        assert_eq!(rig.client.state(), SeqState::Locked);
        assert_eq!(rig.client.unlock().await.unwrap(), LockStatus::Released);
        assert_eq!(rig.client.state(), SeqState::Idle);
    }

    #[tokio::test]
    async fn test_redundant_lock_is_an_error() {
        let rig = manual_rig();
        rig.client.lock().await.unwrap();
        assert!(matches!(
            rig.client.lock().await,
            Err(SequencerError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_release_without_lock_is_an_error() {
        let rig = manual_rig();
        assert!(matches!(
            rig.client.unlock().await,
            Err(SequencerError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_lock_defers_while_in_progress_then_grants() {
        let mut rig = manual_rig();
        let (tx, mut grants) = mpsc::channel(4);
        rig.client.subscribe(EventKind::LockGrant, tx);

        let a = rig.client.queue_change(async_input(), Requester::Driver).await.unwrap();
        let _ = rig.scripts.recv().await.unwrap();

        assert_eq!(rig.client.lock().await.unwrap(), LockStatus::NotAvailable);

        rig.reporter
            .complete(ScriptOutcome::Completed(executed_steps()))
            .await
            .unwrap();

        // The deferred lock is granted at completion, with no further call.
        let grant = grants.recv().await.unwrap();
        assert_eq!(grant.sequence, a.sequence);
        assert!(grant.lock_acquired);
        assert_eq!(rig.client.state(), SeqState::Locked);
    }

    #[tokio::test]
    async fn test_lock_yields_to_pending_sync_waiter() {
        let mut rig = manual_rig();

        // A synchronous request is in flight, so its waiter occupies a
        // slot; the lock must not starve it.
        let a = rig.client.queue_change(full_input(), Requester::Driver).await.unwrap();
        let _ = rig.scripts.recv().await.unwrap();

        assert_eq!(rig.client.lock().await.unwrap(), LockStatus::NotAvailable);

        rig.reporter
            .complete(ScriptOutcome::Completed(executed_steps()))
            .await
            .unwrap();

        // Waiter first, lock immediately after.
        let completed = a.completion.unwrap().await.unwrap();
        assert_eq!(completed, a.sequence);
        assert_eq!(rig.client.state(), SeqState::Locked);
    }

    #[tokio::test]
    async fn test_enqueue_is_accepted_while_locked() {
        let mut rig = manual_rig();
        rig.client.lock().await.unwrap();

        let receipt = rig.client.queue_change(async_input(), Requester::Driver).await.unwrap();
        assert!(rig.scripts.try_recv().is_err());

        rig.client.unlock().await.unwrap();
        let dispatched = rig.scripts.recv().await.unwrap();
        assert_eq!(dispatched.request.sequence, receipt.sequence);
    }

    #[tokio::test]
    async fn test_set_control_requires_the_lock() {
        let rig = manual_rig();

        assert!(matches!(
            rig.client
                .set_control(ClockDomainMask::MCLK, ClockDomainMask::empty())
                .await,
            Err(SequencerError::InvalidState { .. })
        ));

        rig.client.lock().await.unwrap();
        rig.client
            .set_control(ClockDomainMask::MCLK, ClockDomainMask::empty())
            .await
            .unwrap();

        let info = rig.client.info().await.unwrap();
        assert_eq!(info.excluded, ClockDomainMask::MCLK);
        rig.client.unlock().await.unwrap();
    }
}
