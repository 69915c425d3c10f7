//! # Integration Tests
//!
//! Cross-crate tests over the mock session.
//!
//! Covers:
//! - contract snapshots
//! - config file -> engine end-to-end runs (no hardware needed)
//! - failure injection and recovery

#[cfg(test)]
mod contract_tests {
    use contracts::{AspectRatio, ConfigVersion, Size};

    #[test]
    fn test_contracts_compile() {
        let _ = ConfigVersion::V1;
    }

    #[test]
    fn test_size_and_ratio_strings() {
        let size: Size = "1920x1080".parse().unwrap();
        assert_eq!(size.to_string(), "1920x1080");
        assert_eq!(size.aspect_ratio(), AspectRatio::new(16, 9));
        assert_eq!(AspectRatio::new(16, 9).unwrap().to_string(), "16:9");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::ConfigLoader;
    use contracts::{CameraError, ErrorKind, Facing, Mode, Reference, SessionBlueprint, Size};
    use engine::{
        CameraEngine, EngineError, EngineEvent, EngineOptions, InjectedFailure, MockConfig,
        MockOperation, MockSession, StepState,
    };
    use tokio::sync::mpsc;

    type Events = mpsc::UnboundedReceiver<EngineEvent>;

    fn load(toml: &str) -> SessionBlueprint {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        ConfigLoader::load_from_path(file.path()).unwrap()
    }

    fn start(blueprint: &SessionBlueprint, session: MockSession) -> (CameraEngine<MockSession>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine =
            CameraEngine::new(session, Arc::new(tx), EngineOptions::from_blueprint(blueprint)).unwrap();
        (engine, rx)
    }

    fn collect(events: &mut Events) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Config -> engine: video mode with 16:9 constraints and an external
    /// preview selector.
    #[tokio::test]
    async fn test_e2e_config_to_streaming_session() {
        let blueprint = load(
            r#"
surface = "1080x1920"

[camera]
facing = "back"
mode = "video"

[sizes.video]
aspect_ratio = "9:16"
max_height = 2000

[sizes.preview]
aspect_ratio = "9:16"
smallest = true

[snapshot]
max_height = 960
"#,
        );
        let (engine, mut events) = start(&blueprint, MockSession::from_profile(blueprint.device.clone()));

        engine.on_surface_available(blueprint.surface.unwrap()).await.unwrap();
        engine.open().await.unwrap();

        // constraints are in the view frame: 9:16 portrait, at most 2000 high
        assert_eq!(engine.mode(), Mode::Video);
        assert_eq!(engine.video_size(Reference::View), Some(Size::new(1080, 1920)));
        assert_eq!(engine.video_size(Reference::Sensor), Some(Size::new(1920, 1080)));
        // external selector wins over the built-in policy
        assert_eq!(engine.preview_stream_size(Reference::View), Some(Size::new(540, 960)));
        assert_eq!(engine.session().streaming_size(), Some(Size::new(960, 540)));
        assert_eq!(engine.uncropped_snapshot_size(Reference::View), Some(Size::new(540, 960)));

        engine.close().await.unwrap();
        engine.destroy().await;

        let events = collect(&mut events);
        assert!(matches!(events.first(), Some(EngineEvent::CameraOpened(_))));
        assert_eq!(events.last(), Some(&EngineEvent::CameraClosed));
        assert!(!events.iter().any(|e| matches!(e, EngineEvent::Error(_))));
    }

    /// Landscape display on a front-only device: the view frame matches the
    /// sensor frame.
    #[tokio::test]
    async fn test_e2e_front_camera_landscape_display() {
        let blueprint = load(
            r#"
surface = "1920x1080"

[camera]
facing = "front"
display_offset = 90

[[device.cameras]]
facing = "front"
sensor_offset = 270
picture_sizes = ["2592x1944", "1920x1080"]
video_sizes = ["1920x1080"]
preview_sizes = ["1920x1080", "1440x1080", "640x480"]
"#,
        );
        let (engine, _events) = start(&blueprint, MockSession::from_profile(blueprint.device.clone()));

        engine.on_surface_available(blueprint.surface.unwrap()).await.unwrap();
        engine.open().await.unwrap();

        let angles = engine.angles();
        assert_eq!(angles.offset(Reference::Sensor, Reference::View), 0);
        assert!(!angles.flip(Reference::Sensor, Reference::View));

        assert_eq!(engine.capture_size(Reference::View), Some(Size::new(2592, 1944)));
        // 4:3 covering 1920x1080 does not exist, smallest covering stream wins
        assert_eq!(engine.preview_stream_size(Reference::View), Some(Size::new(1920, 1080)));

        let capabilities = engine.capabilities().unwrap();
        assert!(!capabilities.supports_facing(Facing::Back));

        // no back camera on this device
        engine.set_facing(Facing::Back).await.unwrap_err();
        assert_eq!(engine.engine_state().engine, StepState::Stopped);
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_e2e_injected_failure_surfaces_error() {
        let blueprint = SessionBlueprint {
            surface: Some(Size::new(1080, 1920)),
            ..Default::default()
        };
        let session = MockSession::with_config(
            blueprint.device.clone(),
            MockConfig {
                latency: Duration::ZERO,
                failures: vec![InjectedFailure {
                    operation: MockOperation::StartEngine,
                    error: CameraError::failed_to_connect("camera in use"),
                    remaining: 1,
                }],
            },
        );
        let (engine, mut events) = start(&blueprint, session);

        engine.on_surface_available(Size::new(1080, 1920)).await.unwrap();
        let err = engine.open().await.unwrap_err();
        assert_eq!(err.camera_error().map(|e| e.kind), Some(ErrorKind::FailedToConnect));

        let surfaced = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(EngineEvent::Error(error)) = events.recv().await {
                    return error;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(surfaced.kind, ErrorKind::FailedToConnect);

        // the next open succeeds
        engine.open().await.unwrap();
        assert!(engine.engine_state().is_available());
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_e2e_disconnect_recovers_once() {
        let blueprint = SessionBlueprint {
            surface: Some(Size::new(1080, 1920)),
            ..Default::default()
        };
        let (engine, mut events) = start(&blueprint, MockSession::new(blueprint.device.clone()));
        engine.on_surface_available(Size::new(1080, 1920)).await.unwrap();
        engine.open().await.unwrap();
        collect(&mut events);

        engine.report_error(CameraError::disconnected("cable"));
        engine.flush().await.unwrap();

        let events = collect(&mut events);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, EngineEvent::CameraOpened(_)))
                .count(),
            1
        );
        let state = engine.engine_state();
        assert_eq!(state.preview, StepState::Started);
        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_e2e_serialized_under_latency() {
        let mut blueprint = SessionBlueprint {
            surface: Some(Size::new(1080, 1920)),
            ..Default::default()
        };
        blueprint.device.latency_ms = 1;
        let (engine, _events) = start(&blueprint, MockSession::from_profile(blueprint.device.clone()));

        let tasks = vec![
            engine.on_surface_available(Size::new(1080, 1920)),
            engine.open(),
            engine.on_surface_changed(Size::new(720, 960)),
            engine.set_mode(Mode::Video),
            engine.restart(),
            engine.on_surface_destroyed(),
            engine.on_surface_available(Size::new(1080, 1920)),
            engine.set_facing(Facing::Front),
        ];
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(engine.session().max_in_flight(), 1);
        assert_eq!(engine.session().open_facing(), Some(Facing::Front));
        assert_eq!(engine.engine_state().preview, StepState::Started);

        engine.destroy().await;
        assert_eq!(engine.close().await, Err(EngineError::Shutdown));
    }

    /// The engine negotiates exactly what the resolution functions compute
    /// offline for the same inputs.
    #[tokio::test]
    async fn test_e2e_engine_agrees_with_offline_negotiation() {
        let mut blueprint = SessionBlueprint {
            surface: Some(Size::new(720, 1280)),
            ..Default::default()
        };
        blueprint.camera.facing = Facing::Front;
        blueprint.sizes.picture.max_area = Some(2_500_000);

        let camera = blueprint.device.camera(Facing::Front).unwrap().clone();
        let angles = geometry::Angles::with(Facing::Front, camera.sensor_offset, 0, 0).unwrap();
        let selector = sizing::parse_constraints(&blueprint.sizes.picture);
        let capture = geometry::compute_capture_size(&angles, &camera.picture_sizes, &selector).unwrap();
        let preview = geometry::compute_preview_stream_size(
            &angles,
            &camera.preview_sizes,
            capture,
            Size::new(720, 1280),
            None,
        )
        .unwrap();
        assert_eq!(capture, Size::new(1920, 1080));
        assert_eq!(preview, Size::new(1920, 1080));

        let (engine, _events) = start(&blueprint, MockSession::new(blueprint.device.clone()));
        engine.on_surface_available(Size::new(720, 1280)).await.unwrap();
        engine.open().await.unwrap();

        assert_eq!(engine.capture_size(Reference::Sensor), Some(capture));
        assert_eq!(engine.preview_stream_size(Reference::Sensor), Some(preview));
        assert_eq!(engine.session().bound_size(), Some(capture));
        engine.destroy().await;
    }
}
