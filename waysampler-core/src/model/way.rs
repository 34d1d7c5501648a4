use serde::{Deserialize, Serialize};

/// OSM `highway` classes the sampler understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WayKind {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    #[default]
    Unclassified,
    Residential,
    MotorwayLink,
    TrunkLink,
    PrimaryLink,
    SecondaryLink,
    TertiaryLink,
    LivingStreet,
    Pedestrian,
    Cycleway,
    Footway,
    Path,
    Service,
}

impl WayKind {
    pub const ALL: [WayKind; 18] = [
        WayKind::Motorway,
        WayKind::Trunk,
        WayKind::Primary,
        WayKind::Secondary,
        WayKind::Tertiary,
        WayKind::Unclassified,
        WayKind::Residential,
        WayKind::MotorwayLink,
        WayKind::TrunkLink,
        WayKind::PrimaryLink,
        WayKind::SecondaryLink,
        WayKind::TertiaryLink,
        WayKind::LivingStreet,
        WayKind::Pedestrian,
        WayKind::Cycleway,
        WayKind::Footway,
        WayKind::Path,
        WayKind::Service,
    ];

    /// Parses an OSM `highway` tag value. Unknown values fall back to
    /// [`WayKind::Unclassified`].
    pub fn from_highway_tag(tag: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.highway_tag() == tag)
            .unwrap_or_default()
    }

    pub fn highway_tag(self) -> &'static str {
        match self {
            WayKind::Motorway => "motorway",
            WayKind::Trunk => "trunk",
            WayKind::Primary => "primary",
            WayKind::Secondary => "secondary",
            WayKind::Tertiary => "tertiary",
            WayKind::Unclassified => "unclassified",
            WayKind::Residential => "residential",
            WayKind::MotorwayLink => "motorway_link",
            WayKind::TrunkLink => "trunk_link",
            WayKind::PrimaryLink => "primary_link",
            WayKind::SecondaryLink => "secondary_link",
            WayKind::TertiaryLink => "tertiary_link",
            WayKind::LivingStreet => "living_street",
            WayKind::Pedestrian => "pedestrian",
            WayKind::Cycleway => "cycleway",
            WayKind::Footway => "footway",
            WayKind::Path => "path",
            WayKind::Service => "service",
        }
    }

    /// Relative visual weight of the road class, 1.0 for motorways
    pub fn scale(self) -> f64 {
        const NORMAL_SCALE: f64 = 1.0;
        match self {
            WayKind::Motorway => NORMAL_SCALE,
            WayKind::Trunk | WayKind::Primary | WayKind::Secondary | WayKind::Tertiary => {
                NORMAL_SCALE / 2.0
            }
            WayKind::Unclassified
            | WayKind::Residential
            | WayKind::MotorwayLink
            | WayKind::TrunkLink
            | WayKind::PrimaryLink
            | WayKind::SecondaryLink
            | WayKind::TertiaryLink
            | WayKind::LivingStreet
            | WayKind::Pedestrian => NORMAL_SCALE / 3.0,
            WayKind::Cycleway | WayKind::Footway | WayKind::Path | WayKind::Service => {
                NORMAL_SCALE / 3.5
            }
        }
    }
}

/// Named road grouping one or more graph edges
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Way {
    pub name: String,
    pub kind: WayKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highway_tag_round_trip() {
        for kind in WayKind::ALL {
            assert_eq!(WayKind::from_highway_tag(kind.highway_tag()), kind);
        }
    }

    #[test]
    fn test_unknown_tag_defaults() {
        assert_eq!(WayKind::from_highway_tag("bridleway"), WayKind::Unclassified);
        assert_eq!(WayKind::from_highway_tag(""), WayKind::Unclassified);
    }

    #[test]
    fn test_scale_ordering() {
        assert!(WayKind::Motorway.scale() > WayKind::Primary.scale());
        assert!(WayKind::Residential.scale() > WayKind::Footway.scale());
    }
}
