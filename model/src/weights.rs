//! Chargement et export des poids au format safetensors.
//!
//! Le checkpoint est lu une seule fois au démarrage; tout tenseur manquant,
//! mal typé ou mal formé est une erreur fatale avant de servir la moindre
//! requête. Tous les tenseurs sont en f32 petit-boutiste.

use std::path::Path;

use ndarray::{Array1, Array2, Array4};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use crate::config::NetworkConfig;
use crate::error::{ModelError, Result};
use crate::model::attention::SEBlock;
use crate::model::capsule::{ClassCapsLayer, PrimaryCapsLayer};
use crate::model::features::{ConvBlock, FeatureExtractor};
use crate::model::layers::{BatchNorm2d, ConvLayer, Linear};
use crate::model::network::CapsNet;

/// Charge un réseau complet depuis un fichier safetensors
pub fn load_model(path: impl AsRef<Path>, config: NetworkConfig) -> Result<CapsNet> {
    let data = std::fs::read(path.as_ref())?;
    load_model_from_bytes(&data, config)
}

/// Charge un réseau complet depuis un checkpoint déjà en mémoire
pub fn load_model_from_bytes(data: &[u8], config: NetworkConfig) -> Result<CapsNet> {
    config.validate()?;

    let tensors = SafeTensors::deserialize(data)
        .map_err(|e| ModelError::Checkpoint(format!("safetensors illisible: {e}")))?;

    let (in_channels, _, _) = config.input_shape;
    let mut blocks = Vec::new();
    let mut previous = in_channels;

    for (i, &channels) in config.feature_channels.iter().enumerate() {
        blocks.push(load_block(
            &tensors,
            i + 1,
            previous,
            channels,
            config.feature_strides[i],
            config.se_reduction,
        )?);
        previous = channels;
    }

    let primary_out = config.primary.num_capsules * config.primary.capsule_dim;
    let primary = PrimaryCapsLayer::new(
        ConvLayer::new(
            array4(
                &tensors,
                "primary.conv.weight",
                (
                    primary_out,
                    previous,
                    config.primary.kernel_size,
                    config.primary.kernel_size,
                ),
            )?,
            Some(array1(&tensors, "primary.conv.bias", primary_out)?),
            config.primary.stride,
            config.primary.padding,
        ),
        config.primary.num_capsules,
        config.primary.capsule_dim,
    );

    let class_caps = ClassCapsLayer::new(
        array4(
            &tensors,
            "class_caps.weight",
            (
                config.num_primary_capsules(),
                config.num_classes(),
                config.class_capsules.capsule_dim,
                config.primary.capsule_dim,
            ),
        )?,
        config.routing_iterations,
    );

    CapsNet::from_parts(config, FeatureExtractor::new(blocks), primary, class_caps)
}

fn load_block(
    tensors: &SafeTensors,
    index: usize,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    reduction: usize,
) -> Result<ConvBlock> {
    let prefix = format!("features.block{index}");
    let hidden = out_channels / reduction;

    Ok(ConvBlock {
        conv: ConvLayer::new(
            array4(
                tensors,
                &format!("{prefix}.conv.weight"),
                (out_channels, in_channels, 3, 3),
            )?,
            None,
            stride,
            1,
        ),
        bn: BatchNorm2d::new(
            array1(tensors, &format!("{prefix}.bn.weight"), out_channels)?,
            array1(tensors, &format!("{prefix}.bn.bias"), out_channels)?,
            array1(tensors, &format!("{prefix}.bn.running_mean"), out_channels)?,
            array1(tensors, &format!("{prefix}.bn.running_var"), out_channels)?,
        ),
        se: SEBlock::new(
            Linear::new(
                array2(
                    tensors,
                    &format!("{prefix}.se.fc1.weight"),
                    (hidden, out_channels),
                )?,
                array1(tensors, &format!("{prefix}.se.fc1.bias"), hidden)?,
            ),
            Linear::new(
                array2(
                    tensors,
                    &format!("{prefix}.se.fc2.weight"),
                    (out_channels, hidden),
                )?,
                array1(tensors, &format!("{prefix}.se.fc2.bias"), out_channels)?,
            ),
        ),
    })
}

/// Extrait un tenseur f32 et vérifie sa forme exacte
fn floats(tensors: &SafeTensors, name: &str, expected: &[usize]) -> Result<Vec<f32>> {
    let view = tensors
        .tensor(name)
        .map_err(|_| ModelError::MissingTensor(name.to_string()))?;

    if view.dtype() != Dtype::F32 {
        return Err(ModelError::Dtype {
            name: name.to_string(),
            dtype: format!("{:?}", view.dtype()),
        });
    }

    if view.shape() != expected {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            actual: view.shape().to_vec(),
        });
    }

    Ok(view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn array1(tensors: &SafeTensors, name: &str, len: usize) -> Result<Array1<f32>> {
    Ok(Array1::from_vec(floats(tensors, name, &[len])?))
}

fn array2(tensors: &SafeTensors, name: &str, shape: (usize, usize)) -> Result<Array2<f32>> {
    let data = floats(tensors, name, &[shape.0, shape.1])?;
    Array2::from_shape_vec(shape, data)
        .map_err(|e| ModelError::Checkpoint(format!("tenseur {name}: {e}")))
}

fn array4(
    tensors: &SafeTensors,
    name: &str,
    shape: (usize, usize, usize, usize),
) -> Result<Array4<f32>> {
    let data = floats(tensors, name, &[shape.0, shape.1, shape.2, shape.3])?;
    Array4::from_shape_vec(shape, data)
        .map_err(|e| ModelError::Checkpoint(format!("tenseur {name}: {e}")))
}

// ── Export ────────────────────────────────────────────────────────────────

fn le_bytes(values: impl Iterator<Item = f32>) -> Vec<u8> {
    values.flat_map(|v| v.to_le_bytes()).collect()
}

/// Sérialise un réseau au format safetensors (contrepartie de `load_model`,
/// utilisée par les tests et la génération de checkpoints de démonstration)
pub fn export_bytes(model: &CapsNet) -> Result<Vec<u8>> {
    let mut entries: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();

    let mut push = |name: String, shape: Vec<usize>, data: Vec<u8>| {
        entries.push((name, shape, data));
    };

    for (i, block) in model.features.blocks.iter().enumerate() {
        let prefix = format!("features.block{}", i + 1);
        let conv = &block.conv;
        let conv_dim = conv.weights.dim();
        push(
            format!("{prefix}.conv.weight"),
            vec![conv_dim.0, conv_dim.1, conv_dim.2, conv_dim.3],
            le_bytes(conv.weights.iter().copied()),
        );

        let bn = &block.bn;
        for (suffix, values) in [
            ("weight", &bn.gamma),
            ("bias", &bn.beta),
            ("running_mean", &bn.running_mean),
            ("running_var", &bn.running_var),
        ] {
            push(
                format!("{prefix}.bn.{suffix}"),
                vec![values.len()],
                le_bytes(values.iter().copied()),
            );
        }

        for (fc_name, fc) in [("fc1", &block.se.fc1), ("fc2", &block.se.fc2)] {
            let fc_dim = fc.weights.dim();
            push(
                format!("{prefix}.se.{fc_name}.weight"),
                vec![fc_dim.0, fc_dim.1],
                le_bytes(fc.weights.iter().copied()),
            );
            push(
                format!("{prefix}.se.{fc_name}.bias"),
                vec![fc.bias.len()],
                le_bytes(fc.bias.iter().copied()),
            );
        }
    }

    let primary_conv = &model.primary.conv;
    let primary_dim = primary_conv.weights.dim();
    push(
        "primary.conv.weight".to_string(),
        vec![primary_dim.0, primary_dim.1, primary_dim.2, primary_dim.3],
        le_bytes(primary_conv.weights.iter().copied()),
    );
    if let Some(bias) = &primary_conv.bias {
        push(
            "primary.conv.bias".to_string(),
            vec![bias.len()],
            le_bytes(bias.iter().copied()),
        );
    }

    let class_dim = model.class_caps.weights.dim();
    push(
        "class_caps.weight".to_string(),
        vec![class_dim.0, class_dim.1, class_dim.2, class_dim.3],
        le_bytes(model.class_caps.weights.iter().copied()),
    );

    let views: Vec<(String, TensorView)> = entries
        .iter()
        .map(|(name, shape, data)| {
            TensorView::new(Dtype::F32, shape.clone(), data)
                .map(|view| (name.clone(), view))
                .map_err(|e| ModelError::Checkpoint(format!("tenseur {name}: {e}")))
        })
        .collect::<Result<_>>()?;

    safetensors::serialize(views, &None)
        .map_err(|e| ModelError::Checkpoint(format!("sérialisation: {e}")))
}

/// Écrit un réseau dans un fichier safetensors
pub fn export_model(model: &CapsNet, path: impl AsRef<Path>) -> Result<()> {
    let data = export_bytes(model)?;
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path.as_ref(), data)?;
    Ok(())
}
