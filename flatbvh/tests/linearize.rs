use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use flatbvh::{
    create_bvh, flatten_blas, flatten_linear, flatten_tlas, register_log_callback,
    unregister_log_callback, validate_nodes, BuildConfig, Error, FlatBvh, FlatNode,
    LinearBvhNode, MeshInstance, NodeKind, SceneBuilder, Severity, AABB,
};
use glam::{vec3, Mat4, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_boxes(rng: &mut StdRng, n: usize) -> Vec<AABB> {
    (0..n)
        .map(|_| {
            let c = vec3(
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
            );
            let half = vec3(
                rng.random_range(0.05..4.0),
                rng.random_range(0.05..4.0),
                rng.random_range(0.05..4.0),
            );
            AABB::new(c - half, c + half)
        })
        .collect()
}

fn row(n: usize) -> Vec<AABB> {
    (0..n)
        .map(|i| {
            let c = vec3(i as f32 * 2.0, 0.0, 0.0);
            AABB::new(c - Vec3::splat(0.5), c + Vec3::splat(0.5))
        })
        .collect()
}

// Size of the pre-order subtree rooted at `i` (global index `i + base`).
fn subtree(nodes: &[FlatNode], base: usize, i: usize) -> usize {
    match nodes[i].decode(base + i).unwrap() {
        NodeKind::Interior { left, right } => {
            1 + subtree(nodes, base, left as usize - base) + subtree(nodes, base, right as usize - base)
        }
        _ => 1,
    }
}

#[test]
fn four_boxes_give_seven_nodes() {
    init();
    let handle = create_bvh(&row(4), &BuildConfig::default()).unwrap();
    let mut nodes = vec![FlatNode::default(); 7];
    assert_eq!(flatten_blas(&handle, &mut nodes, 0, 0).unwrap(), 7);

    assert_eq!(nodes[0].decode(0).unwrap(), NodeKind::Interior { left: 1, right: 4 });
    let leaves = nodes.iter().filter(|n| n.discriminant() == 1).count();
    assert_eq!(leaves, 4);
    assert_eq!(nodes[0].bounds(), AABB::new(vec3(-0.5, -0.5, -0.5), vec3(6.5, 0.5, 0.5)));
}

#[test]
fn random_trees_are_pre_order_and_complete() {
    init();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let n = rng.random_range(1..200);
        let boxes = random_boxes(&mut rng, n);
        let config = if rng.random_bool(0.5) {
            BuildConfig::default()
        } else {
            BuildConfig::tlas()
        };
        let handle = create_bvh(&boxes, &config).unwrap();
        assert_eq!(handle.node_count().unwrap(), 2 * n - 1);

        let mut nodes = vec![FlatNode::default(); 2 * n - 1];
        let written = flatten_blas(&handle, &mut nodes, 0, 0).unwrap();
        assert_eq!(written, 2 * n - 1);
        validate_nodes(&nodes, 0, &[]).unwrap();
        assert_eq!(subtree(&nodes, 0, 0), written);

        let mut seen = HashSet::new();
        for (i, node) in nodes.iter().enumerate() {
            match node.decode(i).unwrap() {
                NodeKind::Interior { left, right } => {
                    assert_eq!(left as usize, i + 1);
                    assert_eq!(right as usize, left as usize + subtree(&nodes, 0, left as usize));
                    let b = node.bounds();
                    assert!(b.contains(&nodes[left as usize].bounds()));
                    assert!(b.contains(&nodes[right as usize].bounds()));
                }
                NodeKind::GeometryLeaf { first_primitive, primitive_count } => {
                    for k in first_primitive..first_primitive + primitive_count {
                        let prim = handle.permutation().unwrap()[k as usize] as usize;
                        assert!(node.bounds().contains(&boxes[prim]));
                        assert!(seen.insert(prim));
                    }
                }
                NodeKind::InstanceLeaf { .. } => panic!("geometry tree produced an instance leaf"),
            }
        }
        assert_eq!(seen.len(), n);
    }
}

#[test]
fn concatenated_blas_match_standalone_flattening() {
    init();
    let mut rng = StdRng::seed_from_u64(7);
    let meshes: Vec<Vec<AABB>> = (0..4).map(|_| random_boxes(&mut rng, 25)).collect();

    let mut shared = Vec::new();
    let mut prim_base = 0i32;
    for boxes in &meshes {
        let handle = create_bvh(boxes, &BuildConfig::default()).unwrap();
        let start = shared.len();
        let count = handle.node_count().unwrap();
        shared.resize(start + count, FlatNode::default());
        flatten_blas(&handle, &mut shared[start..], start as i32, prim_base).unwrap();

        let mut alone = vec![FlatNode::default(); count];
        flatten_blas(&handle, &mut alone, 0, 0).unwrap();

        validate_nodes(&shared[start..], start, &[]).unwrap();
        for (i, (a, s)) in alone.iter().zip(&shared[start..]).enumerate() {
            assert_eq!(a.bounds(), s.bounds());
            match (a.decode(i).unwrap(), s.decode(start + i).unwrap()) {
                (
                    NodeKind::Interior { left: al, right: ar },
                    NodeKind::Interior { left: sl, right: sr },
                ) => {
                    assert_eq!(sl, al + start as i32);
                    assert_eq!(sr, ar + start as i32);
                }
                (
                    NodeKind::GeometryLeaf { first_primitive: af, primitive_count: ac },
                    NodeKind::GeometryLeaf { first_primitive: sf, primitive_count: sc },
                ) => {
                    assert_eq!(sf, af + prim_base);
                    assert_eq!(sc, ac);
                }
                other => panic!("node {i} changed kind: {other:?}"),
            }
        }
        prim_base += boxes.len() as i32;
    }
    assert_eq!(shared.len(), 4 * 49);
}

#[test]
fn split_builder_covers_every_primitive() {
    init();
    let mut rng = StdRng::seed_from_u64(42);
    // Long thin boxes crossing each other give the spatial splitter work.
    let mut boxes = random_boxes(&mut rng, 60);
    for b in boxes.iter_mut().step_by(3) {
        b.min.x = -60.0;
        b.max.x = 60.0;
    }
    let config = BuildConfig::blas().with_min_overlap(0.0);
    let handle = create_bvh(&boxes, &config).unwrap();
    let bvh = handle.get().unwrap();
    assert!(bvh.permutation().len() >= boxes.len());

    let mut nodes = vec![FlatNode::default(); bvh.node_count()];
    let written = flatten_blas(&handle, &mut nodes, 0, 0).unwrap();
    assert_eq!(written, bvh.node_count());
    validate_nodes(&nodes, 0, &[]).unwrap();

    let mut referenced = 0;
    let mut seen = HashSet::new();
    for (i, node) in nodes.iter().enumerate() {
        if let NodeKind::GeometryLeaf { first_primitive, primitive_count } = node.decode(i).unwrap() {
            referenced += primitive_count as usize;
            for k in first_primitive..first_primitive + primitive_count {
                seen.insert(bvh.permutation()[k as usize]);
            }
        }
    }
    assert_eq!(referenced, bvh.permutation().len());
    assert_eq!(seen.len(), boxes.len());
}

#[test]
fn tlas_leaves_carry_instance_data() {
    init();
    let bounds = vec![
        AABB::new(Vec3::ZERO, Vec3::ONE),
        AABB::new(vec3(5.0, 0.0, 0.0), vec3(6.0, 1.0, 1.0)),
        AABB::new(vec3(10.0, 0.0, 0.0), vec3(11.0, 1.0, 1.0)),
    ];
    let instances: Vec<MeshInstance> = (0..3)
        .map(|i| MeshInstance {
            mesh_id: i,
            material_id: 10 + i,
            bvh_start_index: 100 * i,
        })
        .collect();
    let handle = create_bvh(&bounds, &BuildConfig::tlas()).unwrap();
    let mut nodes = vec![FlatNode::default(); 5];
    flatten_tlas(&handle, &mut nodes, 0, &instances).unwrap();
    validate_nodes(&nodes, 0, &instances).unwrap();

    let mut found = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if let NodeKind::InstanceLeaf { bvh_start_index, material_id, instance } = node.decode(i).unwrap() {
            assert_eq!(node.lr_leaf, [bvh_start_index, material_id, -(instance as i32) - 1]);
            assert_eq!(instances[instance].bvh_start_index, bvh_start_index);
            assert_eq!(instances[instance].material_id, material_id);
            assert_eq!(node.bounds(), bounds[instance]);
            found.push(instance);
        }
    }
    found.sort_unstable();
    assert_eq!(found, vec![0, 1, 2]);
}

#[test]
fn destroyed_handle_is_rejected_everywhere() {
    init();
    let mut handle = create_bvh(&row(3), &BuildConfig::default()).unwrap();
    handle.destroy();
    handle.destroy();
    assert!(handle.is_destroyed());

    let mut flat = vec![FlatNode::default(); 5];
    let mut linear = vec![LinearBvhNode::default(); 5];
    assert!(matches!(flatten_blas(&handle, &mut flat, 0, 0), Err(Error::InvalidHandle)));
    assert!(matches!(flatten_tlas(&handle, &mut flat, 0, &[]), Err(Error::InvalidHandle)));
    assert!(matches!(flatten_linear(&handle, &mut linear), Err(Error::InvalidHandle)));
    assert_eq!(flat, vec![FlatNode::default(); 5]);
}

#[test]
fn builder_rejects_bad_input() {
    init();
    assert!(matches!(create_bvh(&[], &BuildConfig::default()), Err(Error::EmptyInput)));
    let mut boxes = row(3);
    boxes[2] = AABB::new(Vec3::ONE, Vec3::ZERO);
    assert!(matches!(
        create_bvh(&boxes, &BuildConfig::default()),
        Err(Error::MalformedBounds { index: 2 })
    ));
}

#[test]
fn linear_and_tagged_agree() {
    init();
    let mut rng = StdRng::seed_from_u64(99);
    let boxes = random_boxes(&mut rng, 40);
    let handle = create_bvh(&boxes, &BuildConfig::default()).unwrap();
    let count = handle.node_count().unwrap();

    let mut tagged = vec![FlatNode::default(); count];
    let mut linear = vec![LinearBvhNode::default(); count];
    flatten_blas(&handle, &mut tagged, 0, 0).unwrap();
    assert_eq!(flatten_linear(&handle, &mut linear).unwrap(), count);

    for (i, (t, l)) in tagged.iter().zip(&linear).enumerate() {
        assert_eq!(t.bounds(), l.bounds());
        match t.decode(i).unwrap() {
            NodeKind::Interior { left, right } => {
                assert_eq!((left, right), (l.left_child, l.right_child));
                assert_eq!(l.primitive_count, 0);
            }
            NodeKind::GeometryLeaf { first_primitive, primitive_count } => {
                assert_eq!((first_primitive, primitive_count), (l.first_primitive, l.primitive_count));
                assert_eq!((l.left_child, l.right_child), (-1, -1));
            }
            NodeKind::InstanceLeaf { .. } => unreachable!(),
        }
    }
}

#[test]
fn scene_buffers_validate() {
    init();
    let mut rng = StdRng::seed_from_u64(3);
    let mut scene = SceneBuilder::new();
    let meshes: Vec<usize> = (0..3)
        .map(|_| {
            let n = rng.random_range(5..30);
            scene.add_mesh(random_boxes(&mut rng, n))
        })
        .collect();
    for i in 0..8 {
        let t = Mat4::from_translation(vec3(i as f32 * 150.0, 0.0, 0.0));
        scene.add_instance(meshes[i % 3], i as i32, t);
    }

    let bufs = scene.build(&BuildConfig::blas(), &BuildConfig::tlas()).unwrap();
    bufs.validate().unwrap();
    assert_eq!(bufs.instances.len(), 8);
    assert_eq!(bufs.tlas_nodes.len(), 15);
    assert_eq!(bufs.blas_bytes().len(), bufs.blas_nodes.len() * 36);
    for (i, inst) in bufs.instances.iter().enumerate() {
        let root = bufs.blas_root_offsets[i % 3] as i32;
        assert_eq!(inst.bvh_start_index, root);
    }
}

#[test]
fn cache_survives_a_file_round_trip() {
    init();
    let mut rng = StdRng::seed_from_u64(11);
    let flat = FlatBvh::blas(&random_boxes(&mut rng, 33), &BuildConfig::blas(), 0, 0).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesh.bvh");
    flat.save(&path).unwrap();
    let back = FlatBvh::load(&path).unwrap();
    assert_eq!(back.nodes, flat.nodes);
    assert_eq!(back.sorted_indices, flat.sorted_indices);
    assert_eq!(back.bounds, flat.bounds);

    assert!(matches!(FlatBvh::load(dir.path().join("missing.bvh")), Err(Error::Io(_))));
}

#[test]
fn log_callback_sees_build_messages() {
    init();
    let seen: Arc<Mutex<Vec<(String, Severity, usize)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    register_log_callback(move |msg, severity, len| {
        if msg.contains("7 primitives") {
            sink.lock().unwrap().push((msg.to_owned(), severity, len));
        }
    });
    create_bvh(&row(7), &BuildConfig::default()).unwrap();
    assert!(unregister_log_callback());

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    let (msg, severity, len) = &seen[0];
    assert_eq!(*severity, Severity::Info);
    assert_eq!(*len, msg.len());
}
