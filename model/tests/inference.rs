//! Scénarios d'inférence de bout en bout sur la géométrie complète 128x128.

use ndarray::Array4;

use capsnet_model::{CapsNet, NetworkConfig};

fn full_model() -> CapsNet {
    CapsNet::random(NetworkConfig::default()).expect("construction du réseau")
}

#[test]
fn zero_image_gives_three_finite_scores() {
    let model = full_model();
    let input = Array4::zeros((1, 1, 128, 128));

    let scores = model.forward(&input.view()).expect("inférence");

    assert_eq!(scores.dim(), (1, 3));
    for v in scores.iter() {
        assert!(v.is_finite(), "score non fini: {v}");
    }
}

#[test]
fn inference_is_deterministic() {
    let model = full_model();
    let mut input = Array4::zeros((1, 1, 128, 128));
    for h in 0..128 {
        for w in 0..128 {
            input[[0, 0, h, w]] = ((h * 131 + w * 17) % 255) as f32 / 255.0 - 0.5;
        }
    }

    let first = model.forward(&input.view()).unwrap();
    let second = model.forward(&input.view()).unwrap();

    // Mêmes entrées, mêmes poids, même nombre d'itérations: sorties identiques
    assert_eq!(first, second);
}

#[test]
fn batch_elements_are_independent() {
    let model = full_model();

    let mut single = Array4::zeros((1, 1, 128, 128));
    for h in 0..128 {
        for w in 0..128 {
            single[[0, 0, h, w]] = ((h + 3 * w) % 100) as f32 / 100.0;
        }
    }

    let mut batch = Array4::zeros((3, 1, 128, 128));
    for b in 0..3 {
        for h in 0..128 {
            for w in 0..128 {
                batch[[b, 0, h, w]] = if b == 1 { single[[0, 0, h, w]] } else { 0.7 };
            }
        }
    }

    let alone = model.forward(&single.view()).unwrap();
    let together = model.forward(&batch.view()).unwrap();

    for class in 0..3 {
        assert!(
            (alone[[0, class]] - together[[1, class]]).abs() < 1e-5,
            "classe {class}: {} vs {}",
            alone[[0, class]],
            together[[1, class]]
        );
    }
}

#[test]
fn predicted_label_is_one_of_the_classes() {
    let model = full_model();
    let input = Array4::from_elem((1, 1, 128, 128), 0.5_f32);

    let predictions = model.predict(&input.view()).unwrap();

    assert_eq!(predictions.len(), 1);
    assert!(["benign", "malignant", "normal"]
        .contains(&predictions[0].label.as_str()));
}
