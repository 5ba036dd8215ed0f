//! balls2d headless demo
//!
//! Builds one of the bundled scenarios, simulates it and logs where the
//! entities went. Usage:
//!
//! ```text
//! balls2d-demo [scenario] [seconds] [config.json]
//! ```
//!
//! Scenarios: `split-ramps` (default), `narrow-pipes`, `sticky-balls`,
//! `impulse-test`, `random-busy`. Set `RUST_LOG=info` to see the progress.

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::process::ExitCode;
    use std::time::Duration;

    use balls2d::geometry::Aabb;
    use balls2d::sim::{EntityId, RequestHandle, Scene, SceneQuery};
    use balls2d::{Distance, Position, SceneConfig, scenarios};

    const DEFAULT_SECONDS: u64 = 5;

    fn build(scene: &Scene, name: &str) -> Result<Vec<RequestHandle<EntityId>>, String> {
        match name {
            "split-ramps" => Ok(scenarios::split_ramps(scene)),
            "narrow-pipes" => Ok(scenarios::narrow_pipes(scene, Distance::millimeters(100.0))),
            "sticky-balls" => Ok(scenarios::sticky_balls(scene)),
            "impulse-test" => Ok(scenarios::impulse_test(scene)),
            "random-busy" => scenarios::random_busy(scene, 1234, 10_000, 3_000).map_err(|e| e.to_string()),
            other => Err(format!("unknown scenario '{other}'")),
        }
    }

    fn load_config(path: Option<&String>) -> Result<SceneConfig, String> {
        let Some(path) = path else {
            return Ok(SceneConfig::default());
        };
        let json = std::fs::read_to_string(path).map_err(|e| format!("can't read {path}: {e}"))?;
        SceneConfig::from_json(&json).map_err(|e| e.to_string())
    }

    fn run(args: &[String]) -> Result<(), String> {
        let name = args.first().map(String::as_str).unwrap_or("split-ramps");
        let seconds = match args.get(1) {
            Some(seconds) => seconds.parse().map_err(|e| format!("invalid duration '{seconds}': {e}"))?,
            None => DEFAULT_SECONDS,
        };
        let config = load_config(args.get(2))?;

        let scene = Scene::with_config(config).map_err(|e| e.to_string())?;
        let followed = build(&scene, name)?;
        scene.update(Duration::ZERO).map_err(|e| e.to_string())?;
        log::info!(
            "scenario {name}: {} entities, {} tiles",
            scene.entity_count(),
            scene.tile_count()
        );

        let everything = Aabb::around(Position::ORIGIN, scene.config().world_limit());
        let mut query = SceneQuery::new();
        for second in 1..=seconds {
            scene.update(Duration::from_secs(1)).map_err(|e| e.to_string())?;
            for id in followed.iter().filter_map(RequestHandle::id) {
                scene.read_target(&mut query, id, Distance::meters(1.0), Distance::meters(1.0))
                    .map_err(|e| e.to_string())?;
                if let Some(entity) = query.entity(id) {
                    log::info!(
                        "t={second}s {id}: position ({}, {}) velocity {} spin {}",
                        entity.position.x,
                        entity.position.y,
                        entity.velocity,
                        entity.spin
                    );
                }
            }
        }

        scene.read(&mut query, everything);
        let snapshot = serde_json::to_string_pretty(query.entities()).map_err(|e| e.to_string())?;
        println!("{snapshot}");
        Ok(())
    }

    pub fn main() -> ExitCode {
        env_logger::init();
        let args: Vec<String> = std::env::args().skip(1).collect();
        match run(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                log::error!("{error}");
                eprintln!("error: {error}");
                ExitCode::FAILURE
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    native::main()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The library is used directly on the web; there is nothing to run
}
