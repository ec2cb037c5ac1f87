//! Tagged-jet branch assignment.
//!
//! Each event has two tagged jets, `b0` and `b1` in input order. One belongs to
//! the hadronic top (with the two light jets), the other to the leptonic top
//! (with the lepton and the pre-fit neutrino). Both pairings are evaluated:
//!
//! - pairing 0: `b0` → leptonic, `b1` → hadronic
//! - pairing 1: `b1` → leptonic, `b0` → hadronic
//!
//! Selection rule:
//! 1. `discriminant = (m_had0 - m_had1) + (m_lep0 - m_lep1)`
//! 2. choose pairing 0 if `discriminant > 0` **or** `|m_had0 - m_lep0| <= |m_had1 - m_lep1|`
//! 3. otherwise choose pairing 1
//!
//! The two conditions overlap; the rule is kept as is, including the equality
//! case of the second condition, which always resolves to pairing 0.

use crate::domain::{
    AssignmentDecision, BranchAssignment, EventCandidates, JetCandidate, LeptonCandidate,
    MissingMomentum, PairingMasses,
};

/// Candidate top masses for one pairing.
fn pairing_masses(
    hadronic_bjet: &JetCandidate,
    leptonic_bjet: &JetCandidate,
    light: &[JetCandidate; 2],
    lepton: &LeptonCandidate,
    met: &MissingMomentum,
) -> PairingMasses {
    let hadronic = hadronic_bjet.momentum() + light[0].momentum() + light[1].momentum();
    let leptonic = leptonic_bjet.momentum() + lepton.momentum() + met.prefit_neutrino();
    PairingMasses {
        hadronic: hadronic.mass(),
        leptonic: leptonic.mass(),
    }
}

/// Decide which tagged jet goes to which branch.
pub fn resolve_assignment(
    tagged: &[JetCandidate; 2],
    light: &[JetCandidate; 2],
    lepton: &LeptonCandidate,
    met: &MissingMomentum,
) -> AssignmentDecision {
    let pairings = BranchAssignment::ALL.map(|assignment| {
        let (hadronic, leptonic) = assignment.split(tagged);
        pairing_masses(&hadronic, &leptonic, light, lepton, met)
    });

    let discriminant = (pairings[0].hadronic - pairings[1].hadronic)
        + (pairings[0].leptonic - pairings[1].leptonic);

    let assignment = decide(discriminant, &pairings);

    AssignmentDecision {
        assignment,
        discriminant,
        pairings,
    }
}

/// Convenience wrapper over a validated event.
pub fn resolve_event(event: &EventCandidates) -> AssignmentDecision {
    resolve_assignment(&event.tagged, &event.light, &event.lepton, &event.met)
}

fn decide(discriminant: f64, pairings: &[PairingMasses; 2]) -> BranchAssignment {
    if discriminant > 0.0 || pairings[0].abs_difference() <= pairings[1].abs_difference() {
        BranchAssignment::FirstLeptonic
    } else {
        BranchAssignment::FirstHadronic
    }
}

/// Truth pairing from the tagged jets' truth flags, when present and consistent.
pub fn truth_assignment(tagged: &[JetCandidate; 2]) -> Option<BranchAssignment> {
    match (tagged[0].truth_leptonic, tagged[1].truth_leptonic) {
        (Some(true), Some(false)) | (Some(true), None) | (None, Some(false)) => {
            Some(BranchAssignment::FirstLeptonic)
        }
        (Some(false), Some(true)) | (None, Some(true)) | (Some(false), None) => {
            Some(BranchAssignment::FirstHadronic)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> ([JetCandidate; 2], [JetCandidate; 2], LeptonCandidate, MissingMomentum) {
        (
            [
                JetCandidate::tagged(50.0, 0.1, 0.2),
                JetCandidate::tagged(60.0, -0.3, 1.0),
            ],
            [
                JetCandidate::light(40.0, 0.5, -1.0),
                JetCandidate::light(35.0, 0.2, 2.0),
            ],
            LeptonCandidate::new(45.0, 0.0, 0.5),
            MissingMomentum::new(30.0, -0.5),
        )
    }

    #[test]
    fn resolver_is_deterministic() {
        let (tagged, light, lepton, met) = scenario();
        let a = resolve_assignment(&tagged, &light, &lepton, &met);
        let b = resolve_assignment(&tagged, &light, &lepton, &met);
        assert_eq!(a.assignment, b.assignment);
        assert_eq!(a.discriminant.to_bits(), b.discriminant.to_bits());
        assert_eq!(a.pairings, b.pairings);
    }

    #[test]
    fn pairing_masses_match_direct_sums() {
        let (tagged, light, lepton, met) = scenario();
        let d = resolve_assignment(&tagged, &light, &lepton, &met);

        let had0 = (tagged[1].momentum() + light[0].momentum() + light[1].momentum()).mass();
        let lep1 = (tagged[1].momentum() + lepton.momentum() + met.prefit_neutrino()).mass();
        assert!((d.pairings[0].hadronic - had0).abs() < 1e-12);
        assert!((d.pairings[1].leptonic - lep1).abs() < 1e-12);
        assert!(d.pairings.iter().all(|p| p.hadronic.is_finite() && p.leptonic.is_finite()));
    }

    #[test]
    fn swapping_tagged_jets_flips_discriminant_sign() {
        let (tagged, light, lepton, met) = scenario();
        let d = resolve_assignment(&tagged, &light, &lepton, &met);
        let swapped = resolve_assignment(&[tagged[1], tagged[0]], &light, &lepton, &met);
        assert!((d.discriminant + swapped.discriminant).abs() < 1e-9);
        assert_eq!(d.pairings[0], swapped.pairings[1]);
        assert_eq!(d.pairings[1], swapped.pairings[0]);
    }

    #[test]
    fn positive_discriminant_selects_pairing_zero() {
        let pairings = [
            PairingMasses { hadronic: 200.0, leptonic: 150.0 },
            PairingMasses { hadronic: 170.0, leptonic: 171.0 },
        ];
        assert_eq!(decide(9.0, &pairings), BranchAssignment::FirstLeptonic);
    }

    #[test]
    fn smaller_difference_selects_pairing_zero_despite_negative_discriminant() {
        let pairings = [
            PairingMasses { hadronic: 170.0, leptonic: 171.0 },
            PairingMasses { hadronic: 180.0, leptonic: 190.0 },
        ];
        assert_eq!(decide(-29.0, &pairings), BranchAssignment::FirstLeptonic);
    }

    #[test]
    fn negative_discriminant_and_larger_difference_selects_pairing_one() {
        let pairings = [
            PairingMasses { hadronic: 150.0, leptonic: 190.0 },
            PairingMasses { hadronic: 172.0, leptonic: 173.0 },
        ];
        assert_eq!(decide(-5.0, &pairings), BranchAssignment::FirstHadronic);
    }

    #[test]
    fn equal_differences_with_non_positive_discriminant_resolve_to_pairing_zero() {
        let b = JetCandidate::tagged(50.0, 0.0, 0.0);
        let light = [
            JetCandidate::light(40.0, 0.0, 2.0),
            JetCandidate::light(40.0, 0.0, -2.0),
        ];
        let lepton = LeptonCandidate::new(40.0, 0.0, std::f64::consts::PI);
        let met = MissingMomentum::new(40.0, std::f64::consts::PI);
        // Identical tagged jets make both pairings exactly equal.
        let d = resolve_assignment(&[b, b], &light, &lepton, &met);
        assert_eq!(d.discriminant, 0.0);
        assert_eq!(d.pairings[0].abs_difference(), d.pairings[1].abs_difference());
        assert_eq!(d.assignment, BranchAssignment::FirstLeptonic);

        // Same tie on synthetic masses with a strictly negative discriminant.
        let pairings = [
            PairingMasses { hadronic: 160.0, leptonic: 170.0 },
            PairingMasses { hadronic: 175.0, leptonic: 165.0 },
        ];
        let disc = (pairings[0].hadronic - pairings[1].hadronic) + (pairings[0].leptonic - pairings[1].leptonic);
        assert!(disc <= 0.0);
        assert_eq!(decide(disc, &pairings), BranchAssignment::FirstLeptonic);
    }

    /// Leptonic tagged-jet index by the reference rule, written out longhand:
    /// type 0 puts `b0` with the lepton and `b1` with the light jets.
    fn reference_leptonic_index(
        tagged: &[JetCandidate; 2],
        light: &[JetCandidate; 2],
        lepton: &LeptonCandidate,
        met: &MissingMomentum,
    ) -> usize {
        let (b0, b1) = (tagged[0].momentum(), tagged[1].momentum());
        let jets = light[0].momentum() + light[1].momentum();
        let lnu = lepton.momentum() + met.prefit_neutrino();

        let topl0 = (b0 + lnu).mass();
        let toph0 = (b1 + jets).mass();
        let topl1 = (b1 + lnu).mass();
        let toph1 = (b0 + jets).mass();
        let diff0 = (toph0 - topl0).abs();
        let diff1 = (toph1 - topl1).abs();
        let disc = (toph0 - toph1) + (topl0 - topl1);
        if disc > 0.0 || diff0 <= diff1 { 0 } else { 1 }
    }

    #[test]
    fn leptonic_jet_matches_reference_rule_over_a_grid() {
        let (_, light, lepton, met) = scenario();
        for i in 0..40 {
            for j in 0..40 {
                let tagged = [
                    JetCandidate::tagged(20.0 + 5.0 * i as f64, 0.1, 0.2 + 0.15 * j as f64),
                    JetCandidate::tagged(60.0 + 2.0 * j as f64, -0.3 + 0.05 * i as f64, 1.0),
                ];
                let expected = reference_leptonic_index(&tagged, &light, &lepton, &met);
                let d = resolve_assignment(&tagged, &light, &lepton, &met);
                assert_eq!(d.assignment.leptonic_index(), expected, "i={i} j={j}");

                let (hadronic, leptonic) = d.assignment.split(&tagged);
                assert_eq!(leptonic, tagged[expected]);
                assert_eq!(hadronic, tagged[1 - expected]);
            }
        }
    }

    #[test]
    fn truth_assignment_reads_leptonic_flag() {
        let mut a = JetCandidate::tagged(50.0, 0.1, 0.2);
        let mut b = JetCandidate::tagged(60.0, -0.3, 1.0);
        assert_eq!(truth_assignment(&[a, b]), None);

        a.truth_leptonic = Some(true);
        b.truth_leptonic = Some(false);
        assert_eq!(truth_assignment(&[a, b]), Some(BranchAssignment::FirstLeptonic));
        assert_eq!(truth_assignment(&[b, a]), Some(BranchAssignment::FirstHadronic));

        b.truth_leptonic = Some(true);
        assert_eq!(truth_assignment(&[a, b]), None);
    }
}
