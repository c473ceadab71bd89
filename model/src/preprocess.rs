//! Préparation des images: décodage, niveaux de gris, redimensionnement,
//! normalisation — le même pipeline que celui appliqué à l'entraînement
//! (moyenne 0.5, écart-type 0.5).

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use crate::config::NetworkConfig;
use crate::error::{ModelError, Result};

/// Décode une image depuis des octets bruts; une image illisible est une
/// erreur récupérable côté appelant, jamais un crash
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| ModelError::Image(e.to_string()))
}

/// Image décodée -> tenseur [1, 1, hauteur, largeur] dans [-1, 1]
pub fn to_tensor(img: &DynamicImage, config: &NetworkConfig) -> Array4<f32> {
    let (_, height, width) = config.input_shape;

    let resized = img.resize_exact(width as u32, height as u32, FilterType::Triangle);
    let gray = resized.to_luma8();

    let mut tensor = Array4::zeros((1, 1, height, width));
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel.0[0] as f32 / 255.0;
        tensor[[0, 0, y as usize, x as usize]] = (value - 0.5) / 0.5;
    }

    tensor
}

/// Octets bruts -> tenseur d'entrée prêt pour l'inférence
pub fn preprocess_bytes(bytes: &[u8], config: &NetworkConfig) -> Result<Array4<f32>> {
    Ok(to_tensor(&decode(bytes)?, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, value: u8) -> Vec<u8> {
        let img = GrayImage::from_pixel(width, height, Luma([value]));
        let mut buffer = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let config = NetworkConfig::default();
        let bytes = png_bytes(300, 200, 255);

        let tensor = preprocess_bytes(&bytes, &config).unwrap();

        assert_eq!(tensor.dim(), (1, 1, 128, 128));
        for v in tensor.iter() {
            assert!(*v >= -1.0 && *v <= 1.0);
        }
        // Blanc pur -> 1.0 après normalisation
        assert!((tensor[[0, 0, 64, 64]] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_black_image() {
        let config = NetworkConfig::default();
        let bytes = png_bytes(128, 128, 0);

        let tensor = preprocess_bytes(&bytes, &config).unwrap();

        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_undecodable_bytes_are_an_error() {
        let config = NetworkConfig::default();

        let result = preprocess_bytes(b"pas une image", &config);

        assert!(matches!(result, Err(ModelError::Image(_))));
    }
}
