//! Console presentation of received SPDUs and their BSMs.

use colored::*;

use crate::types::{Bsm, SpduFragment};
use crate::verify::VerificationReport;

pub fn print_divider() {
    println!("{}", "-".repeat(80));
}

pub fn print_spdu(spdu: &SpduFragment, report: &VerificationReport) {
    let verdict = if report.is_valid() {
        format!("{} TRUE", "✓".green().bold())
    } else {
        let mut reasons = Vec::new();
        if !report.certificate_ok {
            reasons.push("bad certificate");
        }
        if !report.signature_ok {
            reasons.push("bad signature");
        }
        if !report.recent {
            reasons.push("stale");
        }
        format!("{} FALSE ({})", "✗".red().bold(), reasons.join(", "))
    };

    println!("{}", "SPDU received!".bold());
    println!("\tID:\t\t{}", spdu.vehicle_id);
    println!("\tSequence:\t{}", spdu.sequence_number);
    println!("\tValid:\t\t{}", verdict);
    println!("\tFragments:\t{}", spdu.fragment_count);
    println!("\tScheme:\t\t{}", spdu.scheme.label());
    println!(
        "\tSent:\t\t{}",
        spdu.signed_data
            .tbs_data
            .header_info
            .timestamp
            .format("%Y-%m-%d %H:%M:%S%.6f")
    );
}

pub fn print_bsm(bsm: &Bsm) {
    println!("{}", "BSM received!".bold());
    println!(
        "\tLocation:\t{}, {}, {}",
        bsm.latitude, bsm.longitude, bsm.elevation
    );
    println!("\tSpeed:\t\t{:.1} km/h", bsm.speed_kph);
    println!("\tHeading:\t{:.1}°", bsm.heading_degrees);
}
