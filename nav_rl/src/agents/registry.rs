//! Predefined agents selectable with `--agent`.

use super::architecture::{Activation, ConvLayer, PolicyArchitecture};

/// Every agent name accepted by `--agent`.
pub const AGENT_NAMES: [&str; 21] = [
    "MLP_ARENA2D",
    "AGENT_1",
    "AGENT_2",
    "AGENT_3",
    "AGENT_4",
    "AGENT_5",
    "AGENT_6",
    "AGENT_7",
    "AGENT_8",
    "AGENT_9",
    "AGENT_10",
    "AGENT_11",
    "AGENT_12",
    "AGENT_13",
    "AGENT_14",
    "AGENT_15",
    "AGENT_16",
    "AGENT_17",
    "AGENT_18",
    "AGENT_19",
    "AGENT_20",
];

const SMALL_SCAN: [ConvLayer; 2] = [ConvLayer::new(32, 5, 2), ConvLayer::new(32, 3, 2)];
const WIDE_SCAN: [ConvLayer; 2] = [ConvLayer::new(32, 5, 2), ConvLayer::new(64, 3, 2)];
const DEEP_SCAN: [ConvLayer; 3] = [
    ConvLayer::new(32, 8, 4),
    ConvLayer::new(64, 4, 2),
    ConvLayer::new(64, 3, 1),
];
const LONG_SCAN: [ConvLayer; 3] = [
    ConvLayer::new(32, 5, 2),
    ConvLayer::new(64, 3, 2),
    ConvLayer::new(64, 3, 2),
];

/// Look up the network recipe of a predefined agent.
pub fn predefined_architecture(name: &str) -> Option<PolicyArchitecture> {
    use Activation::{Relu, Tanh};

    let arch = match name {
        "MLP_ARENA2D" => PolicyArchitecture::mlp(&[64, 64], &[64], &[64], Relu),

        // Convolutional family
        "AGENT_1" => PolicyArchitecture::cnn(&SMALL_SCAN, 256, &[], &[128], &[128], Relu),
        "AGENT_2" => PolicyArchitecture::cnn(&WIDE_SCAN, 256, &[], &[64, 64], &[64, 64], Relu),
        "AGENT_3" => PolicyArchitecture::cnn(&DEEP_SCAN, 512, &[], &[128], &[128], Relu),
        "AGENT_4" => PolicyArchitecture::cnn(&DEEP_SCAN, 512, &[], &[128], &[128], Tanh),
        "AGENT_9" => PolicyArchitecture::cnn(
            &[ConvLayer::new(16, 5, 2), ConvLayer::new(32, 3, 2)],
            128,
            &[],
            &[64],
            &[64],
            Relu,
        ),
        "AGENT_10" => PolicyArchitecture::cnn(&SMALL_SCAN, 128, &[128], &[64], &[64], Tanh),
        "AGENT_11" => PolicyArchitecture::cnn(
            &[ConvLayer::new(64, 5, 2), ConvLayer::new(64, 3, 2)],
            512,
            &[],
            &[256],
            &[256],
            Relu,
        ),
        "AGENT_12" => PolicyArchitecture::cnn(
            &[ConvLayer::new(32, 3, 1), ConvLayer::new(32, 3, 2)],
            256,
            &[],
            &[128, 64],
            &[128, 64],
            Relu,
        ),
        "AGENT_17" => PolicyArchitecture::cnn(&LONG_SCAN, 256, &[256], &[128], &[128], Relu),
        "AGENT_18" => PolicyArchitecture::cnn(&LONG_SCAN, 256, &[256], &[128], &[128], Tanh),

        // MLP family
        "AGENT_5" => PolicyArchitecture::mlp(&[128], &[64, 64], &[64, 64], Relu),
        "AGENT_6" => PolicyArchitecture::mlp(&[256, 128], &[64], &[64], Relu),
        "AGENT_7" => PolicyArchitecture::mlp(&[64, 64, 64], &[64], &[64], Tanh),
        "AGENT_8" => PolicyArchitecture::mlp(&[], &[128, 128], &[128, 128], Tanh),
        "AGENT_13" => PolicyArchitecture::mlp(&[256], &[128], &[128], Relu),
        "AGENT_14" => PolicyArchitecture::mlp(&[512, 256], &[64], &[64], Relu),
        "AGENT_15" => PolicyArchitecture::mlp(&[128, 128], &[64, 64], &[64, 64], Tanh),
        "AGENT_16" => PolicyArchitecture::mlp(&[64], &[32, 32], &[32, 32], Relu),
        // AGENT_20 has always been trained with AGENT_19's network.
        "AGENT_19" | "AGENT_20" => PolicyArchitecture::mlp(&[256, 256], &[128], &[128], Relu),

        _ => return None,
    };
    Some(arch)
}

/// Whether `name` is a predefined agent.
pub fn is_predefined(name: &str) -> bool {
    AGENT_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::architecture::PolicyFamily;

    #[test]
    fn test_every_name_has_an_architecture() {
        for name in AGENT_NAMES {
            let arch = predefined_architecture(name)
                .unwrap_or_else(|| panic!("{} has no architecture", name));
            assert!(arch.validate(360).is_ok(), "{} invalid for 360 beams", name);
        }
        assert!(predefined_architecture("AGENT_21").is_none());
    }

    #[test]
    fn test_families() {
        for name in ["AGENT_1", "AGENT_2", "AGENT_3", "AGENT_4", "AGENT_9", "AGENT_10",
            "AGENT_11", "AGENT_12", "AGENT_17", "AGENT_18"]
        {
            assert_eq!(predefined_architecture(name).unwrap().family(), PolicyFamily::Cnn);
        }
        for name in ["MLP_ARENA2D", "AGENT_5", "AGENT_6", "AGENT_7", "AGENT_8", "AGENT_13",
            "AGENT_14", "AGENT_15", "AGENT_16", "AGENT_19", "AGENT_20"]
        {
            assert_eq!(predefined_architecture(name).unwrap().family(), PolicyFamily::Mlp);
        }
    }

    #[test]
    fn test_agent_20_aliases_agent_19() {
        assert_eq!(
            predefined_architecture("AGENT_20"),
            predefined_architecture("AGENT_19")
        );
    }
}
