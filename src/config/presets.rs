//! Named stage-configuration presets.
//!
//! Two fixed lookup tables back the named presets accepted in the pipeline
//! configuration file: one shared by the retrieval and feature-extraction
//! presets, one for the matcher preset. Inline configurations bypass these
//! tables entirely.

use std::collections::BTreeMap;

use serde_yaml::Value;

use super::{ModelConfig, StageConfig};

fn options<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Look up a named extraction-style preset (retrieval or local features).
pub fn extraction_conf(name: &str) -> Option<StageConfig> {
    let conf = match name {
        // Global retrieval descriptors, one vector per image.
        "netvlad" => StageConfig {
            output: "global-feats-netvlad".into(),
            model: ModelConfig {
                name: "netvlad".into(),
                options: options([]),
            },
            preprocessing: Some(options([("resize_max", Value::from(1024))])),
        },
        "superpoint-aachen" => StageConfig {
            output: "feats-superpoint-n4096-r1024".into(),
            model: ModelConfig {
                name: "superpoint".into(),
                options: options([
                    ("nms_radius", Value::from(3)),
                    ("max_keypoints", Value::from(4096)),
                ]),
            },
            preprocessing: Some(options([
                ("grayscale", Value::from(true)),
                ("resize_max", Value::from(1024)),
            ])),
        },
        "disk" => StageConfig {
            output: "feats-disk".into(),
            model: ModelConfig {
                name: "disk".into(),
                options: options([("max_keypoints", Value::from(5000))]),
            },
            preprocessing: Some(options([
                ("grayscale", Value::from(false)),
                ("resize_max", Value::from(1600)),
            ])),
        },
        // Classic SIFT, the only family the COLMAP backend accepts.
        "sift" => StageConfig {
            output: "feats-sift".into(),
            model: ModelConfig {
                name: "sift".into(),
                options: options([("max_num_features", Value::from(8192))]),
            },
            preprocessing: Some(options([("grayscale", Value::from(true))])),
        },
        _ => return None,
    };
    Some(conf)
}

/// Look up a named matcher preset.
pub fn matcher_conf(name: &str) -> Option<StageConfig> {
    let conf = match name {
        "superpoint+lightglue" => StageConfig {
            output: "matches-superpoint-lightglue".into(),
            model: ModelConfig {
                name: "lightglue".into(),
                options: options([("features", Value::from("superpoint"))]),
            },
            preprocessing: None,
        },
        "disk+lightglue" => StageConfig {
            output: "matches-disk-lightglue".into(),
            model: ModelConfig {
                name: "lightglue".into(),
                options: options([("features", Value::from("disk"))]),
            },
            preprocessing: None,
        },
        "nn-ratio" => StageConfig {
            output: "matches-nn-mutual-ratio08".into(),
            model: ModelConfig {
                name: "nearest-neighbor".into(),
                options: options([
                    ("do_mutual_check", Value::from(true)),
                    ("ratio_threshold", Value::from(0.8)),
                ]),
            },
            preprocessing: None,
        },
        "sift-nn" => StageConfig {
            output: "matches-sift-nn".into(),
            model: ModelConfig {
                name: "sift".into(),
                options: options([
                    ("max_ratio", Value::from(0.8)),
                    ("cross_check", Value::from(true)),
                ]),
            },
            preprocessing: None,
        },
        _ => return None,
    };
    Some(conf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extraction_presets() {
        for name in ["netvlad", "superpoint-aachen", "disk", "sift"] {
            let conf = extraction_conf(name).unwrap_or_else(|| panic!("missing preset {name}"));
            assert!(!conf.output.is_empty());
            assert!(!conf.model.name.is_empty());
        }
    }

    #[test]
    fn test_known_matcher_presets() {
        for name in ["superpoint+lightglue", "disk+lightglue", "nn-ratio", "sift-nn"] {
            let conf = matcher_conf(name).unwrap_or_else(|| panic!("missing preset {name}"));
            assert!(!conf.output.is_empty());
        }
    }

    #[test]
    fn test_unknown_preset_is_none() {
        assert!(extraction_conf("r2d2").is_none());
        assert!(matcher_conf("superglue-fast").is_none());
        // Lookup is case-sensitive.
        assert!(extraction_conf("NetVLAD").is_none());
    }

    #[test]
    fn test_output_stems_are_distinct() {
        let outputs: Vec<String> = ["netvlad", "superpoint-aachen", "disk", "sift"]
            .iter()
            .map(|n| extraction_conf(n).unwrap().output)
            .collect();
        let mut deduped = outputs.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), outputs.len());
    }

    #[test]
    fn test_nn_ratio_threshold() {
        let conf = matcher_conf("nn-ratio").unwrap();
        assert_eq!(
            conf.model.options.get("ratio_threshold"),
            Some(&Value::from(0.8))
        );
    }
}
