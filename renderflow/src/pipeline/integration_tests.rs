//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::{RenderRequest, RunContext, RunState, SurfaceHandle};
    use crate::errors::PipelineError;
    use crate::observability::{instrument_pipeline, CollectingLogSink};
    use crate::pipeline::{ParseVerdict, Pipeline, Stage};
    use crate::plugin::FnPlugin;
    use crate::testing::{ManualFrameDriver, MockEngineAdapter};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn basic_run_args() -> (SurfaceHandle, RenderRequest) {
        (
            SurfaceHandle::new("canvas-1"),
            RenderRequest::new("helmet", "https://assets.example/helmet.glb"),
        )
    }

    #[tokio::test]
    async fn scenario_a_init_handler_populates_engine_handles() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        pipeline
            .hooks
            .init_engine
            .tap("Init", |ctx: Arc<RunContext>| async move {
                ctx.engine_handles.set(serde_json::json!({"ready": true}));
                Ok(())
            });

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();

        assert_eq!(
            ctx.engine_handles.get(),
            Some(serde_json::json!({"ready": true}))
        );
        // The run went through postProcess and finished.
        assert_eq!(ctx.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn scenario_b_parse_rejection_skips_build_scene() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        let built = Arc::new(AtomicUsize::new(0));

        pipeline
            .hooks
            .resource_parse
            .tap("Validator", |_ctx| async move {
                Ok(Some(ParseVerdict::rejected("magic bytes mismatch")))
            });
        {
            let built = Arc::clone(&built);
            pipeline
                .hooks
                .build_scene
                .tap("Builder", move |ctx: Arc<RunContext>| {
                    let built = Arc::clone(&built);
                    async move {
                        built.fetch_add(1, Ordering::SeqCst);
                        Ok(ctx)
                    }
                });
        }

        let (surface, request) = basic_run_args();
        let err = pipeline.run(surface, request).await.unwrap_err();

        assert!(matches!(err, PipelineError::ValidationRejected { ref reason }
            if reason == "magic bytes mismatch"));
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scenario_c_frame_failures_are_absorbed() {
        let driver = ManualFrameDriver::new();
        let adapter = Arc::new(MockEngineAdapter::with_frame_driver(Arc::clone(&driver)));
        let pipeline = Pipeline::new(adapter);

        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        {
            let a = Arc::clone(&a);
            pipeline.hooks.render_loop.tap("A", move |_ctx| {
                let a = Arc::clone(&a);
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        {
            let b = Arc::clone(&b);
            pipeline.hooks.render_loop.tap("B", move |_ctx| {
                let b = Arc::clone(&b);
                async move {
                    let n = b.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 2 {
                        anyhow::bail!("buffer overrun on frame {n}")
                    }
                    Ok(())
                }
            });
        }

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();
        assert!(driver.is_registered());
        assert!(ctx.render_state.is_running());

        assert!(driver.tick(16.0).await);
        assert!(!ctx.render_state.has_error());

        assert!(driver.tick(16.0).await);
        assert!(ctx.render_state.has_error());

        assert!(driver.tick(16.0).await);
        // The error from tick 2 is not cleared by the successful tick 3.
        assert!(ctx.render_state.has_error());
        assert!(ctx
            .render_state
            .last_error_message()
            .is_some_and(|m| m.contains("buffer overrun")));

        assert_eq!(a.load(Ordering::SeqCst), 3);
        assert_eq!(b.load(Ordering::SeqCst), 3);
        assert_eq!(ctx.render_state.frame_count(), 3);
    }

    #[tokio::test]
    async fn scenario_d_cancel_before_run_fails_fast() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        let inits = Arc::new(AtomicUsize::new(0));
        {
            let inits = Arc::clone(&inits);
            pipeline
                .hooks
                .init_engine
                .tap("Init", move |ctx: Arc<RunContext>| {
                    let inits = Arc::clone(&inits);
                    async move {
                        inits.fetch_add(1, Ordering::SeqCst);
                        ctx.engine_handles.set(serde_json::json!({"ready": true}));
                        Ok(())
                    }
                });
        }

        let token = CancellationToken::new();
        token.cancel("user closed viewer");

        let (surface, request) = basic_run_args();
        let err = pipeline
            .run_with_token(surface, request, token)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::InitEngine,
                ..
            }
        ));
        // No handler ever ran, so no engine handles were populated.
        assert_eq!(inits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_between_parse_and_build_skips_build_and_render() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        let built = Arc::new(AtomicUsize::new(0));
        let rendered = Arc::new(AtomicUsize::new(0));

        pipeline
            .hooks
            .resource_parse
            .tap("CancelDuringParse", |ctx: Arc<RunContext>| async move {
                ctx.cancel("tab hidden");
                Ok(None)
            });
        {
            let built = Arc::clone(&built);
            pipeline
                .hooks
                .build_scene
                .tap("Builder", move |ctx: Arc<RunContext>| {
                    let built = Arc::clone(&built);
                    async move {
                        built.fetch_add(1, Ordering::SeqCst);
                        Ok(ctx)
                    }
                });
        }
        {
            let rendered = Arc::clone(&rendered);
            pipeline.hooks.render_loop.tap("Renderer", move |_ctx| {
                let rendered = Arc::clone(&rendered);
                async move {
                    rendered.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        let (surface, request) = basic_run_args();
        let err = pipeline.run(surface, request).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::BuildScene,
                ..
            }
        ));
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(rendered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stages_run_in_order_and_waterfalls_thread_the_context() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        macro_rules! logging_tap {
            ($hook:expr, $label:literal) => {{
                let log = Arc::clone(&log);
                $hook.tap($label, move |_ctx: Arc<RunContext>| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push($label);
                        Ok(())
                    }
                });
            }};
        }

        logging_tap!(pipeline.hooks.init_engine, "init");
        {
            let log = Arc::clone(&log);
            pipeline
                .hooks
                .resource_load
                .tap("load", move |ctx: Arc<RunContext>| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push("load");
                        Ok(ctx)
                    }
                });
        }
        {
            let log = Arc::clone(&log);
            pipeline
                .hooks
                .resource_parse
                .tap("parse", move |_ctx: Arc<RunContext>| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push("parse");
                        Ok(None)
                    }
                });
        }
        {
            let log = Arc::clone(&log);
            pipeline
                .hooks
                .build_scene
                .tap("build", move |ctx: Arc<RunContext>| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push("build");
                        Ok(ctx)
                    }
                });
        }
        logging_tap!(pipeline.hooks.render_loop, "render");
        logging_tap!(pipeline.hooks.post_process, "post");

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["init", "load", "parse", "build", "render", "post"]
        );
        // Without a frame driver the render loop is dispatched exactly once.
        assert_eq!(ctx.render_state.frame_count(), 0);
        assert_eq!(ctx.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn handler_failure_aborts_the_run_with_attribution() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        pipeline
            .hooks
            .resource_load
            .tap("FlakyLoader", |_ctx: Arc<RunContext>| async move {
                anyhow::bail!("connection reset")
            });

        let (surface, request) = basic_run_args();
        let err = pipeline.run(surface, request).await.unwrap_err();
        match err {
            PipelineError::Handler(tap) => {
                assert_eq!(tap.hook, "resourceLoad");
                assert_eq!(tap.tap, "FlakyLoader");
            }
            other => panic!("expected handler failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_isolates_failures() {
        let adapter = Arc::new(MockEngineAdapter::new());
        let pipeline = Pipeline::new(adapter.clone());
        let cleaned = Arc::new(AtomicUsize::new(0));

        pipeline
            .hooks
            .dispose
            .tap("Broken", |_ctx: Arc<RunContext>| {
                anyhow::bail!("texture pool already freed")
            });
        {
            let cleaned = Arc::clone(&cleaned);
            pipeline
                .hooks
                .dispose
                .tap("Cleaner", move |_ctx: Arc<RunContext>| {
                    cleaned.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
        }

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();

        pipeline.dispose(&ctx);
        assert!(ctx.is_cancelled());
        assert!(ctx.is_disposed());
        assert!(!ctx.render_state.is_running());
        assert_eq!(ctx.state(), RunState::Disposed);
        // The broken handler did not block the cleaner or adapter teardown.
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.dispose_calls(), 1);

        // Second call: flags only, no duplicate hook dispatch.
        pipeline.dispose(&ctx);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.dispose_calls(), 1);
    }

    #[tokio::test]
    async fn context_dispose_delegates_to_owning_pipeline() {
        let adapter = Arc::new(MockEngineAdapter::new());
        let pipeline = Pipeline::new(adapter.clone());

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();

        ctx.dispose();
        assert!(ctx.is_disposed());
        assert_eq!(adapter.dispose_calls(), 1);
    }

    #[tokio::test]
    async fn ticks_stop_after_dispose() {
        let driver = ManualFrameDriver::new();
        let adapter = Arc::new(MockEngineAdapter::with_frame_driver(Arc::clone(&driver)));
        let pipeline = Pipeline::new(adapter);

        let frames = Arc::new(AtomicUsize::new(0));
        {
            let frames = Arc::clone(&frames);
            pipeline.hooks.render_loop.tap("Counter", move |_ctx| {
                let frames = Arc::clone(&frames);
                async move {
                    frames.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();

        assert!(driver.tick(16.0).await);
        pipeline.dispose(&ctx);
        assert!(!driver.tick(16.0).await);
        assert_eq!(frames.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.render_state.frame_count(), 1);
    }

    #[tokio::test]
    async fn use_preset_registers_in_argument_order() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        let first: Arc<dyn crate::plugin::Plugin> = Arc::new(FnPlugin::new("First", |p| {
            p.hooks
                .post_process
                .tap("First", |_ctx: Arc<RunContext>| async { Ok(()) });
        }));
        let second: Arc<dyn crate::plugin::Plugin> = Arc::new(FnPlugin::new("Second", |p| {
            p.hooks
                .post_process
                .tap("Second", |_ctx: Arc<RunContext>| async { Ok(()) });
        }));

        pipeline.use_preset(&[first, second]);
        assert_eq!(pipeline.plugin_names(), vec!["First", "Second"]);
        assert_eq!(
            pipeline.hooks.post_process.tap_names(),
            vec!["First", "Second"]
        );
    }

    #[tokio::test]
    async fn instrumentation_does_not_change_outcomes() {
        let run_once = |instrument: bool| async move {
            let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
            let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

            let sink = Arc::new(CollectingLogSink::new());
            if instrument {
                instrument_pipeline(&pipeline, sink.clone());
            }

            {
                let order = Arc::clone(&order);
                pipeline
                    .hooks
                    .resource_parse
                    .tap("PassThrough", move |_ctx: Arc<RunContext>| {
                        let order = Arc::clone(&order);
                        async move {
                            order.lock().push("pass");
                            Ok(None)
                        }
                    });
            }
            {
                let order = Arc::clone(&order);
                pipeline
                    .hooks
                    .resource_parse
                    .tap("Decider", move |_ctx: Arc<RunContext>| {
                        let order = Arc::clone(&order);
                        async move {
                            order.lock().push("decide");
                            Ok(Some(ParseVerdict::Accepted))
                        }
                    });
            }
            {
                let order = Arc::clone(&order);
                pipeline
                    .hooks
                    .resource_parse
                    .tap("Never", move |_ctx: Arc<RunContext>| {
                        let order = Arc::clone(&order);
                        async move {
                            order.lock().push("never");
                            Ok(None)
                        }
                    });
            }

            let (surface, request) = basic_run_args();
            let result = pipeline.run(surface, request).await;
            let outcome = (result.is_ok(), order.lock().clone(), sink.records().len());
            outcome
        };

        let (ok_plain, order_plain, records_plain) = run_once(false).await;
        let (ok_wrapped, order_wrapped, records_wrapped) = run_once(true).await;

        assert_eq!(ok_plain, ok_wrapped);
        assert_eq!(order_plain, order_wrapped);
        assert_eq!(order_plain, vec!["pass", "decide"]);
        assert_eq!(records_plain, 0);
        // Two resourceParse invocations were observed.
        assert_eq!(records_wrapped, 2);
    }

    #[tokio::test]
    async fn instrumented_run_records_every_stage() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));
        let sink = Arc::new(CollectingLogSink::new());
        instrument_pipeline(&pipeline, sink.clone());

        pipeline
            .hooks
            .init_engine
            .tap("Init", |_ctx: Arc<RunContext>| async { Ok(()) });
        pipeline
            .hooks
            .render_loop
            .tap("Render", |_ctx: Arc<RunContext>| async { Ok(()) });
        pipeline
            .hooks
            .post_process
            .tap("Post", |_ctx: Arc<RunContext>| async { Ok(()) });
        pipeline
            .hooks
            .dispose
            .tap("Teardown", |_ctx: Arc<RunContext>| Ok(()));

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();
        pipeline.dispose(&ctx);

        assert_eq!(sink.records_for_hook("initEngine").len(), 1);
        assert_eq!(sink.records_for_hook("renderLoop").len(), 1);
        assert_eq!(sink.records_for_hook("postProcess").len(), 1);
        assert_eq!(sink.records_for_hook("dispose").len(), 1);
        assert!(sink.records().iter().all(|r| !r.is_error()));
    }

    #[tokio::test]
    async fn stage_cleanups_and_locks_coordinate_plugins() {
        let pipeline = Pipeline::new(Arc::new(MockEngineAdapter::new()));

        pipeline
            .hooks
            .init_engine
            .tap("GpuInit", |ctx: Arc<RunContext>| async move {
                ctx.metadata.ensure();
                assert!(ctx.metadata.lock_stage(Stage::InitEngine));
                ctx.metadata
                    .add_stage_cleanup(Stage::InitEngine, "release-gpu", || async { Ok(()) });
                ctx.metadata.mark_stage_completed(Stage::InitEngine, true);
                ctx.metadata.unlock_stage(Stage::InitEngine);
                Ok(())
            });

        pipeline
            .hooks
            .post_process
            .tap("Finalizer", |ctx: Arc<RunContext>| async move {
                assert!(ctx.metadata.is_stage_completed(Stage::InitEngine));
                let (completed, failed) = ctx.metadata.run_stage_cleanups(Stage::InitEngine).await;
                assert_eq!(completed, vec!["release-gpu"]);
                assert!(failed.is_empty());
                Ok(())
            });

        let (surface, request) = basic_run_args();
        let ctx = pipeline.run(surface, request).await.unwrap();
        assert_eq!(ctx.metadata.pending_cleanups(Stage::InitEngine), 0);
    }
}
