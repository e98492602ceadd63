use raybvh::camera::{Camera, Frame};
use raybvh::config::{Builder, DemoConfig, SceneKind};
use raybvh::scenes::{self, instanced::Instanced};
use raybvh::{BlasInstance, Bvh, Bvh8, CompressedBvh, Result, Tlas};
use std::time::Instant;

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    log::error!("Failed to read {}: {}", path, e);
                    return;
                }
            };
            match DemoConfig::from_toml_str(&source) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("Invalid config {}: {}", path, e);
                    return;
                }
            }
        }
        None => DemoConfig::default(),
    };
    log::debug!("{:?}", config);

    if let Err(e) = run(&config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn report(name: &str, frame: &Frame, reference: Option<&Frame>, elapsed: std::time::Duration) {
    let agreement = reference.map_or(1.0, |r| r.agreement(frame, 1e-3));
    log::info!(
        "{:<12} {:>10.2?}  hits {:>7}  steps/ray {:>6.2}  agreement {:.4}",
        name,
        elapsed,
        frame.hit_count(),
        frame.mean_steps(),
        agreement
    );
}

fn run(config: &DemoConfig) -> Result<()> {
    log::info!("Building scene...");
    let (camera, verts) = scenes::load(config);
    log::info!("{} triangles, {}x{} rays", verts.len() / 3, camera.image_width(), camera.image_height());

    let now = Instant::now();
    let mut bvh = Bvh::new();
    match config.builder {
        Builder::Quick => bvh.build_quick(&verts)?,
        Builder::Sah => bvh.build(&verts)?,
        Builder::Spatial => bvh.build_spatial(&verts)?,
    }
    log::info!(
        "Built {:?} tree in {:?}: {} nodes, SAH cost {:.2}",
        bvh.kind(),
        now.elapsed(),
        bvh.node_count(),
        bvh.sah_cost()
    );

    log::info!("Rendering...");
    let now = Instant::now();
    let binary = camera.render(&bvh);
    report("binary", &binary, None, now.elapsed());

    if config.packets {
        let now = Instant::now();
        let packets = camera.render_packets(&bvh);
        report("packets", &packets, Some(&binary), now.elapsed());
    }

    let now = Instant::now();
    let mut wide = Bvh8::convert_from(&bvh)?;
    let cwbvh = CompressedBvh::convert_from(&mut wide, config.payload)?;
    log::info!(
        "Converted in {:?}: {} wide nodes, {} compressed nodes, {} triangle bytes",
        now.elapsed(),
        wide.used_nodes(),
        cwbvh.nodes().len(),
        cwbvh.tris_as_bytes().len()
    );

    let now = Instant::now();
    let frame = camera.render(&wide);
    report("wide", &frame, Some(&binary), now.elapsed());

    let now = Instant::now();
    let frame = camera.render(&cwbvh);
    report("compressed", &frame, Some(&binary), now.elapsed());

    if config.scene == SceneKind::Instanced {
        run_instanced(config, &camera, &binary)?;
    }

    log::info!("Done.");
    Ok(())
}

fn run_instanced(config: &DemoConfig, camera: &Camera, flat: &Frame) -> Result<()> {
    let now = Instant::now();
    let mut blas = Bvh::new();
    blas.build(&Instanced::blas_mesh().to_soup())?;
    let instances = Instanced::transforms(config.seed)
        .into_iter()
        .map(|m| BlasInstance::with_transform(&blas, m))
        .collect::<Result<Vec<_>>>()?;
    let tlas = Tlas::new(instances)?;
    log::info!("Built TLAS over {} instances in {:?}", tlas.instances().len(), now.elapsed());

    let now = Instant::now();
    let frame = camera.render(&tlas);
    report("tlas", &frame, Some(flat), now.elapsed());
    Ok(())
}
