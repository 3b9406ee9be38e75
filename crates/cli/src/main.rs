use anyhow::Context;
use api_shared::{ClinicStatus, OnboardClinicReq, PatientListQuery};
use camp_core::{AnalyticsService, ClinicService, CoreConfig, PatientService, Storage};
use camp_uuid::ShardableUuid;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "camp")]
#[command(about = "Camp clinic records administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Onboard a clinic with its built-in roles and first admin
    Onboard {
        /// Clinic display name
        name: String,
        /// Login handle, lowercase letters, digits and hyphens
        slug: String,
        /// Clinic contact email
        contact_email: String,
        /// Admin full name
        admin_name: String,
        /// Admin login email
        admin_email: String,
        /// Admin password (at least 8 characters)
        admin_password: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        contact_phone: Option<String>,
        #[arg(long)]
        admin_phone: Option<String>,
    },
    /// List all clinics
    ListClinics,
    /// List patients of a clinic
    ListPatients {
        /// Clinic slug
        slug: String,
        /// Search on name, phone or registration number
        #[arg(long)]
        query: Option<String>,
        /// Only patients registered at this camp
        #[arg(long)]
        camp: Option<String>,
    },
    /// Print analytics for one camp as JSON
    CampAnalytics {
        /// Clinic slug
        slug: String,
        /// Camp id
        camp_id: String,
    },
    /// Suspend a clinic; its staff can no longer sign in
    Suspend {
        /// Clinic slug
        slug: String,
    },
    /// Reactivate a suspended clinic
    Activate {
        /// Clinic slug
        slug: String,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'camp --help' for commands");
        return Ok(());
    };

    let cfg = CoreConfig::from_lookup(|key| std::env::var(key).ok())
        .context("failed to load configuration")?;
    let storage = Storage::new(Arc::new(cfg));
    let clinics = ClinicService::new(storage.clone());

    match command {
        Commands::Onboard {
            name,
            slug,
            contact_email,
            admin_name,
            admin_email,
            admin_password,
            address,
            contact_phone,
            admin_phone,
        } => {
            let onboarded = clinics.onboard(OnboardClinicReq {
                name,
                slug,
                address,
                contact_email,
                contact_phone,
                admin_name,
                admin_email,
                admin_password,
                admin_phone,
            })?;
            let res = onboarded.to_response();
            println!(
                "Onboarded clinic '{}' ({}) with admin {}",
                res.clinic.slug, res.clinic.id, res.admin.email
            );
        }
        Commands::ListClinics => {
            let all = clinics.list();
            if all.is_empty() {
                println!("No clinics found.");
            }
            for clinic in all {
                println!(
                    "{}  {}  {}  created {}",
                    clinic.slug,
                    clinic.status,
                    clinic.name,
                    clinic.created_at.format("%Y-%m-%d")
                );
            }
        }
        Commands::ListPatients { slug, query, camp } => {
            let clinic_id = clinic_id(&clinics, &slug)?;
            let patients = PatientService::new(storage).list_in_clinic(
                &clinic_id,
                PatientListQuery {
                    q: query,
                    camp_id: camp,
                },
            )?;
            if patients.is_empty() {
                println!("No patients found.");
            }
            for patient in patients {
                println!(
                    "{}  {} {}  {}  {}",
                    patient.registration_number,
                    patient.first_name,
                    patient.last_name,
                    patient.sex,
                    patient.phone.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::CampAnalytics { slug, camp_id } => {
            let clinic_id = clinic_id(&clinics, &slug)?;
            let analytics = AnalyticsService::new(storage).camp_in_clinic(&clinic_id, &camp_id)?;
            println!("{}", serde_json::to_string_pretty(&analytics)?);
        }
        Commands::Suspend { slug } => {
            let clinic = clinics.set_status(&slug, ClinicStatus::Suspended)?;
            println!("Clinic '{}' is now {}", clinic.slug, clinic.status);
        }
        Commands::Activate { slug } => {
            let clinic = clinics.set_status(&slug, ClinicStatus::Active)?;
            println!("Clinic '{}' is now {}", clinic.slug, clinic.status);
        }
    }

    Ok(())
}

fn clinic_id(clinics: &ClinicService, slug: &str) -> anyhow::Result<ShardableUuid> {
    let clinic = clinics.find_by_slug(slug)?;
    Ok(ShardableUuid::parse(&clinic.id)?)
}
