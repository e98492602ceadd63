use nalgebra::{Point3, Vector3};
use raybvh::config::DemoConfig;
use raybvh::objects::tri_mesh::TriMesh;
use raybvh::scenes::instanced::Instanced;
use raybvh::scenes::Scene;
use raybvh::{BlasInstance, Bvh, Hittable, Ray, Tlas, TriangleSoup};

fn config() -> DemoConfig {
    DemoConfig {
        image_width: 64,
        seed: 5,
        ..DemoConfig::default()
    }
}

/// The instances baked into one world-space soup, in instance order.
fn flatten(mesh: &TriMesh, instances: &[BlasInstance]) -> Vec<Point3<f32>> {
    let mut world = TriMesh::default();
    for instance in instances {
        let mut copy = mesh.clone();
        copy.transform(instance.transform());
        world.append(&copy);
    }
    world.to_soup()
}

#[test]
fn two_level_scene_renders_like_the_flattened_one() {
    let config = config();
    let mesh = Instanced::blas_mesh();
    let mut blas = Bvh::new();
    blas.build(&mesh.to_soup()).unwrap();
    let instances = Instanced::transforms(config.seed)
        .into_iter()
        .map(|m| BlasInstance::with_transform(&blas, m).unwrap())
        .collect::<Vec<_>>();
    let tlas = Tlas::new(instances).unwrap();

    let flat_verts = Instanced::build_scene(&config);
    assert_eq!(flat_verts, flatten(&mesh, tlas.instances()));
    let mut flat = Bvh::new();
    flat.build(&flat_verts).unwrap();

    let camera = Instanced::build_camera(&config);
    let reference = camera.render(&flat);
    let frame = camera.render(&tlas);
    assert!(reference.hit_count() > 0);
    assert!(frame.agreement(&reference, 1e-3) > 0.99);
}

#[test]
fn hits_name_the_instance_and_its_local_primitive() {
    let config = config();
    let mesh = Instanced::blas_mesh();
    let per_instance = mesh.tri_count() as u32;
    let mut blas = Bvh::new();
    blas.build(&mesh.to_soup()).unwrap();
    let instances = Instanced::transforms(config.seed)
        .into_iter()
        .map(|m| BlasInstance::with_transform(&blas, m).unwrap())
        .collect::<Vec<_>>();
    let tlas = Tlas::new(instances).unwrap();
    let flat_verts = flatten(&mesh, tlas.instances());
    let soup = TriangleSoup::new(&flat_verts);

    let camera = Instanced::build_camera(&config);
    let mut checked = 0;
    for y in (0..camera.image_height()).step_by(4) {
        for x in (0..camera.image_width()).step_by(4) {
            let ray = camera.get_ray(x, y);
            let mut expected = ray;
            soup.intersect(&mut expected);
            let mut got = ray;
            tlas.intersect(&mut got);
            if !expected.hit.is_hit() || (got.hit.t - expected.hit.t).abs() > 1e-3 {
                continue;
            }
            assert_eq!(got.hit.inst * per_instance + got.hit.prim, expected.hit.prim);
            checked += 1;
        }
    }
    assert!(checked > 20);
}

#[test]
fn moved_instances_are_found_after_rebuild() {
    let mesh = Instanced::blas_mesh();
    let mut blas = Bvh::new();
    blas.build(&mesh.to_soup()).unwrap();
    let instances = vec![BlasInstance::new(&blas), BlasInstance::new(&blas)];
    let mut tlas = Tlas::new(instances).unwrap();

    let ray = Ray::new(Point3::new(5.0, 0.2, 10.0), -Vector3::z());
    let mut traced = ray;
    tlas.intersect(&mut traced);
    assert!(!traced.hit.is_hit());

    let moved = &mut tlas.instances_mut()[1];
    moved.translate(Vector3::new(5.0, 0.0, 0.0));
    moved.update();
    tlas.rebuild().unwrap();

    let mut traced = ray;
    tlas.intersect(&mut traced);
    assert!(traced.hit.is_hit());
    assert_eq!(traced.hit.inst, 1);
    assert!(tlas.is_occluded(&Ray::with_t_max(ray.origin, ray.direction, 100.0)));

    let flat = flatten(&mesh, tlas.instances());
    let soup = TriangleSoup::new(&flat);
    let mut expected = ray;
    soup.intersect(&mut expected);
    assert!((expected.hit.t - traced.hit.t).abs() < 1e-4);
}
