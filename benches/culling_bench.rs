use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Mat4, Vec3};
use hearth_deferred::camera::init_camera;
use hearth_deferred::math::create_aabb;
use hearth_deferred::scene::{
    add_render_item, create_scene, register_geometry, register_mesh, DrawArgs, MeshGeometry, RenderItemDesc,
    SceneData,
};
use hearth_deferred::spatial::{create_octree, ensure_octree, OctreeData};
use hearth_deferred::visibility::{build_draw_list_linear, build_draw_list_octree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

const LOD_THRESHOLD: f32 = 50.0;

fn prepare_scene(count: usize) -> (SceneData, OctreeData) {
    let mut scene = create_scene();
    let geometry = register_geometry(&mut scene, &MeshGeometry::default());
    let mesh = register_mesh(
        &mut scene,
        "cube",
        geometry,
        DrawArgs {
            index_count: 36,
            start_index: 0,
            base_vertex: 0,
        },
        create_aabb(Vec3::splat(-1.0), Vec3::ONE),
    );

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..count {
        let position = Vec3::new(
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
        );
        let mut desc = RenderItemDesc::new(mesh, "default");
        desc.world = Mat4::from_translation(position);
        add_render_item(&mut scene, desc).expect("item");
    }

    let mut octree = create_octree(4, 8);
    ensure_octree(&mut octree, &scene);
    (scene, octree)
}

fn bench_visibility(c: &mut Criterion) {
    // Looking down -Z from the edge of the volume
    let camera = init_camera(Vec3::new(0.0, 0.0, 120.0), -std::f32::consts::FRAC_PI_2, 0.0);

    let mut group = c.benchmark_group("visibility");
    for &count in &[1_000usize, 10_000, 50_000] {
        let (scene, octree) = prepare_scene(count);
        group.bench_with_input(BenchmarkId::new("linear", count), &count, |b, _| {
            b.iter(|| build_draw_list_linear(black_box(&scene), &camera, LOD_THRESHOLD))
        });
        group.bench_with_input(BenchmarkId::new("octree", count), &count, |b, _| {
            b.iter(|| build_draw_list_octree(black_box(&octree), &scene, &camera, LOD_THRESHOLD))
        });
    }
    group.finish();
}

fn bench_octree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_build");
    for &count in &[1_000usize, 10_000] {
        let (scene, _) = prepare_scene(count);
        group.bench_with_input(BenchmarkId::new("rebuild", count), &count, |b, _| {
            b.iter(|| {
                let mut octree = create_octree(4, 8);
                ensure_octree(&mut octree, black_box(&scene))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_visibility, bench_octree_build);
criterion_main!(benches);
