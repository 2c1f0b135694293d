#[cfg(test)]
mod tests {
    use crate::command::Command;
    use crate::dispatch::{decode_envelope, reply_route, ProtocolViolation, ReplyRoute};
    use crate::model::{ReplyStatus, SubmitStatus};
    use crate::subjects;
    use crate::workload::{
        run_workload, LineOutcome, RetryPolicy, SubmitChannel, TransportError,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn ok_status() -> SubmitStatus {
        SubmitStatus {
            status: ReplyStatus::Ok,
            message: None,
            body: None,
        }
    }

    /// Fake submission channel: pops scripted results per call and records
    /// every call it sees. Flags any overlapping submissions.
    struct ScriptedChannel {
        script: Mutex<VecDeque<Result<SubmitStatus, TransportError>>>,
        calls: Mutex<Vec<(u64, String)>>,
        in_flight: AtomicBool,
        overlapped: AtomicBool,
    }

    impl ScriptedChannel {
        fn new(script: Vec<Result<SubmitStatus, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
            }
        }

        fn always_ok() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl SubmitChannel for ScriptedChannel {
        async fn submit(
            &self,
            seq: u64,
            command: &Command,
        ) -> Result<SubmitStatus, TransportError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.calls.lock().push((seq, command.kind().to_string()));
            self.in_flight.store(false, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or_else(|| Ok(ok_status()))
        }
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn driver_replays_lines_in_file_order() {
        let workload = "\
[1] ADD,oY01WVirLr,63511.53
[2] QUOTE,oY01WVirLr,ABC

[4] SET_BUY_TRIGGER,oY01WVirLr,ABC,50.00
[5] DUMPLOG,report.log
";
        let channel = ScriptedChannel::always_ok();
        let report = run_workload(Cursor::new(workload), &channel, &fast_retry(3))
            .await
            .unwrap();

        let calls = channel.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                (1, "ADD".to_string()),
                (2, "QUOTE".to_string()),
                (4, "SET_BUY_TRIGGER".to_string()),
                (5, "DUMPLOG".to_string()),
            ]
        );
        assert!(!channel.overlapped.load(Ordering::SeqCst));
        assert_eq!(report.completed(), 4);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn driver_continues_past_a_bad_line() {
        let workload = "\
[5] BUY,oY01WVirLr
[6] ADD,oY01WVirLr,10.00
";
        let channel = ScriptedChannel::always_ok();
        let report = run_workload(Cursor::new(workload), &channel, &fast_retry(3))
            .await
            .unwrap();

        assert_eq!(report.lines.len(), 2);
        assert!(matches!(
            report.lines[0].outcome,
            LineOutcome::DecodeFailed(crate::command::DecodeError::ArityMismatch {
                kind: "BUY",
                ..
            })
        ));
        assert_eq!(report.lines[0].seq, 1);
        assert_eq!(report.lines[0].raw, "[5] BUY,oY01WVirLr");
        assert!(matches!(report.lines[1].outcome, LineOutcome::Completed(_)));
        // The bad line never reached the channel.
        assert_eq!(channel.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn driver_retries_transport_failures_then_succeeds() {
        let channel = ScriptedChannel::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Publish("broker down".into())),
            Ok(ok_status()),
        ]);
        let report = run_workload(
            Cursor::new("[1] ADD,u1,10.00\n"),
            &channel,
            &fast_retry(3),
        )
        .await
        .unwrap();

        assert_eq!(channel.calls.lock().len(), 3);
        assert!(matches!(report.lines[0].outcome, LineOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn driver_gives_up_on_a_line_after_exhausting_retries() {
        let channel = ScriptedChannel::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Ok(ok_status()),
        ]);
        let report = run_workload(
            Cursor::new("[1] ADD,u1,10.00\n[2] COMMIT_BUY,u1\n"),
            &channel,
            &fast_retry(2),
        )
        .await
        .unwrap();

        assert!(matches!(
            report.lines[0].outcome,
            LineOutcome::TransportFailed {
                attempts: 2,
                last: TransportError::Timeout,
            }
        ));
        // The failure is scoped to its line; the run continued.
        assert!(matches!(report.lines[1].outcome, LineOutcome::Completed(_)));
        assert!(report.has_failures());
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn envelope_decode_rejects_garbage() {
        assert!(matches!(
            decode_envelope(b"not json"),
            Err(ProtocolViolation::BadBody(_))
        ));
        assert!(matches!(
            decode_envelope(br#"{"kind":"WITHDRAW","user":"u1"}"#),
            Err(ProtocolViolation::BadBody(_))
        ));
        // Legal kind, illegal field set.
        assert!(matches!(
            decode_envelope(br#"{"kind":"COMMIT_BUY","user":"u1","stock":"ABC"}"#),
            Err(ProtocolViolation::BadBody(_))
        ));
    }

    #[test]
    fn envelope_decode_accepts_a_wire_command() {
        let cmd = decode_envelope(br#"{"kind":"ADD","user":"u1","amount":63511.53}"#).unwrap();
        assert_eq!(cmd.kind(), "ADD");
    }

    #[test]
    fn reply_route_requires_reply_and_correlation_headers() {
        assert_eq!(
            reply_route(None),
            Err(ProtocolViolation::MissingHeaders)
        );

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(subjects::HDR_REPLY_TO, "_INBOX.abc");
        assert_eq!(
            reply_route(Some(&headers)),
            Err(ProtocolViolation::MissingHeader(
                subjects::HDR_CORRELATION_ID
            ))
        );

        headers.insert(subjects::HDR_CORRELATION_ID, "corr-1");
        headers.insert(subjects::HDR_COMMAND_SEQ, "42");
        assert_eq!(
            reply_route(Some(&headers)),
            Ok(ReplyRoute {
                reply_to: "_INBOX.abc".to_string(),
                corr_id: "corr-1".to_string(),
                seq: Some(42),
            })
        );
    }

    #[test]
    fn reply_route_treats_bad_seq_as_absent() {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(subjects::HDR_REPLY_TO, "_INBOX.abc");
        headers.insert(subjects::HDR_CORRELATION_ID, "corr-1");
        headers.insert(subjects::HDR_COMMAND_SEQ, "not-a-number");
        let route = reply_route(Some(&headers)).unwrap();
        assert_eq!(route.seq, None);
    }
}
