fn main() {
    println!("Run `cargo test -p pipeline` to execute the end-to-end pipeline tests.");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dropgate_client::{
        Backoff, ChunkSink, ChunkUploader, ClientError, ReconnectConfig, StreamClient, StreamEvent,
        StreamTransport, UploaderConfig,
    };
    use dropgate_events::EventBus;
    use dropgate_protocol::Config;
    use dropgate_protocol::events::{Event, EventKind, UploadProgressPayload};
    use dropgate_protocol::messages::CreateUploadRequest;
    use dropgate_storage::{DiskStore, MemoryStore, ObjectStore};
    use dropgate_upload::{InMemoryRecordStore, RecordStore, UploadManager, checksum_bytes};

    struct Pipeline {
        manager: Arc<UploadManager>,
        records: Arc<InMemoryRecordStore>,
        bus: Arc<EventBus>,
    }

    fn pipeline_with(config: Config, objects: Arc<dyn ObjectStore>) -> Pipeline {
        let records = Arc::new(InMemoryRecordStore::new());
        let bus = Arc::new(EventBus::with_config(&config));
        let manager = Arc::new(UploadManager::new(
            config,
            objects,
            Arc::clone(&records) as Arc<dyn RecordStore>,
            Arc::clone(&bus),
        ));
        Pipeline {
            manager,
            records,
            bus,
        }
    }

    fn request(total: u64, hint: Option<u64>) -> CreateUploadRequest {
        CreateUploadRequest {
            file_name: "dataset.bin".into(),
            workspace_id: "ws".into(),
            total_size: total,
            chunk_size_hint: hint,
            content_hash: None,
        }
    }

    /// The reference scenario: a 12 MB file with a 5 MB chunk hint plans
    /// three chunks (5, 5, 2 MB), reassembles byte-for-byte, and leaves
    /// exactly one durable object behind.
    #[tokio::test]
    async fn twelve_megabyte_upload_roundtrip() {
        let objects = Arc::new(MemoryStore::new());
        let p = pipeline_with(Config::default(), Arc::clone(&objects) as Arc<dyn ObjectStore>);

        let total: usize = 12 * 1024 * 1024;
        let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();

        let resp = p
            .manager
            .create_session("alice", &request(total as u64, Some(5 * 1024 * 1024)))
            .await
            .unwrap();
        assert_eq!(resp.chunk_size, 5_242_880);
        assert_eq!(resp.chunk_count, 3);

        for (index, chunk) in data.chunks(resp.chunk_size as usize).enumerate() {
            p.manager
                .submit_chunk(
                    "alice",
                    &resp.session_id,
                    index as u32,
                    chunk.to_vec(),
                    &checksum_bytes(chunk),
                )
                .await
                .unwrap();
        }

        let record = p.manager.finalize("alice", &resp.session_id).await.unwrap();
        assert_eq!(record.total_size, 12_582_912);

        let assembled = objects.get(&record.storage_key).await.unwrap();
        assert_eq!(assembled, data);
        assert!(
            objects
                .keys_with_prefix(&format!("uploads/{}/", resp.session_id))
                .is_empty()
        );
        assert_eq!(objects.len(), 1);
        assert_eq!(p.records.file_count(), 1);
    }

    /// Same flow against the disk backend, with out-of-order and
    /// duplicated chunk submissions along the way.
    #[tokio::test]
    async fn disk_backed_upload_with_retries_and_reordering() {
        let dir = tempfile::TempDir::new().unwrap();
        let objects = Arc::new(DiskStore::new(dir.path()).await.unwrap());
        let config = Config {
            max_file_size: 100_000,
            max_chunk_size: 1_000,
            min_chunk_size: 100,
            ..Config::default()
        };
        let p = pipeline_with(config, Arc::clone(&objects) as Arc<dyn ObjectStore>);

        let data: Vec<u8> = (0..2_500usize).map(|i| (i % 241) as u8).collect();
        let resp = p
            .manager
            .create_session("alice", &request(2_500, Some(1_000)))
            .await
            .unwrap();
        assert_eq!(resp.chunk_count, 3);

        let chunks: Vec<(u32, Vec<u8>)> = data
            .chunks(1_000)
            .enumerate()
            .map(|(i, c)| (i as u32, c.to_vec()))
            .collect();

        // Last chunk first, then the rest, then an at-least-once retry.
        for (index, bytes) in chunks.iter().rev() {
            p.manager
                .submit_chunk(
                    "alice",
                    &resp.session_id,
                    *index,
                    bytes.clone(),
                    &checksum_bytes(bytes),
                )
                .await
                .unwrap();
        }
        let ack = p
            .manager
            .submit_chunk(
                "alice",
                &resp.session_id,
                0,
                chunks[0].1.clone(),
                &checksum_bytes(&chunks[0].1),
            )
            .await
            .unwrap();
        assert_eq!(ack.received_count, 3);

        let record = p.manager.finalize("alice", &resp.session_id).await.unwrap();
        assert_eq!(objects.get(&record.storage_key).await.unwrap(), data);
    }

    /// The chunk uploader drives the real manager through a sink, with a
    /// bounded number of in-flight chunks.
    #[tokio::test]
    async fn client_uploader_feeds_the_manager() {
        let objects = Arc::new(MemoryStore::new());
        let config = Config {
            max_file_size: 100_000,
            max_chunk_size: 500,
            min_chunk_size: 100,
            ..Config::default()
        };
        let p = pipeline_with(config, Arc::clone(&objects) as Arc<dyn ObjectStore>);

        let data: Vec<u8> = (0..4_800usize).map(|i| (i % 239) as u8).collect();
        let resp = p
            .manager
            .create_session("alice", &request(4_800, Some(500)))
            .await
            .unwrap();

        struct ManagerSink {
            manager: Arc<UploadManager>,
            session_id: String,
        }

        #[async_trait::async_trait]
        impl ChunkSink for ManagerSink {
            async fn submit(
                &self,
                index: u32,
                bytes: Vec<u8>,
                checksum: &str,
            ) -> Result<(), ClientError> {
                self.manager
                    .submit_chunk("alice", &self.session_id, index, bytes, checksum)
                    .await
                    .map(|_| ())
                    .map_err(|e| ClientError::Rejected(e.to_string()))
            }
        }

        let sink = ManagerSink {
            manager: Arc::clone(&p.manager),
            session_id: resp.session_id.clone(),
        };
        let uploader = ChunkUploader::new(UploaderConfig {
            max_in_flight: 3,
            ..UploaderConfig::default()
        });
        uploader
            .upload(&data, resp.chunk_size, &sink)
            .await
            .unwrap();

        let record = p.manager.finalize("alice", &resp.session_id).await.unwrap();
        assert_eq!(record.total_size, 4_800);
        assert_eq!(objects.get(&record.storage_key).await.unwrap(), data);
    }

    /// Progress events observed through a live subscription track the
    /// upload monotonically and end with completion markers.
    #[tokio::test]
    async fn subscriber_observes_upload_lifecycle() {
        let objects = Arc::new(MemoryStore::new());
        let config = Config {
            max_file_size: 10_000,
            max_chunk_size: 100,
            min_chunk_size: 10,
            ..Config::default()
        };
        let p = pipeline_with(config, objects);
        let sub = p.bus.subscribe("observer", vec!["ws".into()], None);

        let data = vec![7u8; 300];
        let resp = p
            .manager
            .create_session("alice", &request(300, Some(100)))
            .await
            .unwrap();
        for (index, chunk) in data.chunks(100).enumerate() {
            p.manager
                .submit_chunk(
                    "alice",
                    &resp.session_id,
                    index as u32,
                    chunk.to_vec(),
                    &checksum_bytes(chunk),
                )
                .await
                .unwrap();
        }
        p.manager.finalize("alice", &resp.session_id).await.unwrap();

        let mut progress = Vec::new();
        let mut kinds = Vec::new();
        while let Some(event) = sub.try_recv() {
            kinds.push(event.kind);
            if event.kind == EventKind::UploadProgress {
                let payload: UploadProgressPayload = event.parse_payload().unwrap();
                progress.push(payload.received_count);
            }
        }

        assert_eq!(progress, vec![1, 2, 3]);
        assert_eq!(kinds.last(), Some(&EventKind::FileReady));
        assert!(kinds.contains(&EventKind::UploadComplete));
        // Sequence numbers were gapless.
        assert_eq!(p.bus.latest_sequence("ws"), kinds.len() as u64);
    }

    /// A transport that drains a real bus subscription per physical
    /// connection, and can kill the active connection to simulate a
    /// network drop.
    struct BusTransport {
        bus: Arc<EventBus>,
        kill: std::sync::Mutex<Vec<tokio::sync::oneshot::Sender<()>>>,
    }

    impl BusTransport {
        fn new(bus: Arc<EventBus>) -> Arc<Self> {
            Arc::new(Self {
                bus,
                kill: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn drop_connection(&self) {
            for sender in self.kill.lock().unwrap().drain(..) {
                let _ = sender.send(());
            }
        }
    }

    #[async_trait::async_trait]
    impl StreamTransport for BusTransport {
        async fn connect(
            &self,
            from: Option<u64>,
        ) -> Result<tokio::sync::mpsc::Receiver<Event>, ClientError> {
            let subscription = self.bus.subscribe("viewer", vec!["ws".into()], from);
            let (tx, rx) = tokio::sync::mpsc::channel(64);
            let (kill_tx, mut kill_rx) = tokio::sync::oneshot::channel();
            self.kill.lock().unwrap().push(kill_tx);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = &mut kill_rx => break,
                        event = subscription.recv() => match event {
                            Some(event) => {
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            });
            Ok(rx)
        }
    }

    /// Disconnect mid-stream, reconnect with `from` = last seen sequence:
    /// later events arrive exactly once, no duplicates, no gap while the
    /// replay buffer still holds them.
    #[tokio::test]
    async fn stream_client_survives_connection_drop() {
        let bus = Arc::new(EventBus::new(64, 32));
        let transport = BusTransport::new(Arc::clone(&bus));
        let mut client = StreamClient::connect(
            transport.clone(),
            Backoff::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
                jitter_ratio: 0.25,
            }),
        );

        for _ in 0..17 {
            bus.publish(EventKind::WorkspaceActivity, "ws", &serde_json::json!({}));
        }

        let mut received = Vec::new();
        while received.len() < 17 {
            match client.next().await.unwrap() {
                StreamEvent::Event(event) => received.push(event.sequence_number),
                StreamEvent::State(_) => {}
            }
        }
        assert_eq!(received, (1..=17).collect::<Vec<u64>>());

        // Drop the physical connection, then publish more.
        transport.drop_connection();
        for _ in 0..3 {
            bus.publish(EventKind::WorkspaceActivity, "ws", &serde_json::json!({}));
        }

        while received.len() < 20 {
            match client.next().await.unwrap() {
                StreamEvent::Event(event) => received.push(event.sequence_number),
                StreamEvent::State(_) => {}
            }
        }
        assert_eq!(received, (1..=20).collect::<Vec<u64>>());
        client.close();
    }
}
