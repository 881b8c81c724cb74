use crate::infra::{local_portal, parse_date, LocalPortal, PortalService};
use crate::server::load_template;
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thesis_portal::config::StorageConfig;
use thesis_portal::error::AppError;
use thesis_portal::identity::{AccountMetadata, IdentityEvent, Registration};
use thesis_portal::workflows::thesis::{
    DefenseForm, InternshipForm, LecturerForm, PendingFile, ProposalForm,
    RequirementKind, ScheduleRequest, SeminarForm, SeminarKind, UserRole,
};
use zip::write::FileOptions;
use zip::ZipWriter;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Master `.docx` letter template. A built-in sample is used when omitted.
    #[arg(long)]
    pub(crate) template: Option<PathBuf>,
    /// File to submit as the seminar report and defense documents.
    #[arg(long)]
    pub(crate) report: Option<PathBuf>,
    /// Defense date (YYYY-MM-DD). Defaults to one week from today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) defense_date: Option<NaiveDate>,
    /// Directory the generated invitation letter is written to.
    #[arg(long)]
    pub(crate) output_dir: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        template,
        report,
        defense_date,
        output_dir,
    } = args;
    let defense_date =
        defense_date.unwrap_or_else(|| Local::now().date_naive() + Duration::days(7));

    let LocalPortal {
        service,
        auth,
        files,
    } = local_portal(StorageConfig::default());
    let mut events = service.identity().subscribe();

    println!("Thesis portal demo");
    match template {
        Some(path) => load_template(&service, &path)?,
        None => {
            service.seed_template("Template_Sidang_Master.docx", sample_template()?)?;
        }
    }
    println!("Master template: {}", service.template().name);

    let code = auth.issue_oauth_code(
        "budi@kampus.ac.id",
        AccountMetadata {
            full_name: Some("Dr. Budi Santoso".to_string()),
            role: Some(UserRole::Lecturer),
            identifier: Some("198701012010".to_string()),
        },
    );
    let lecturer_user = service
        .identity()
        .login_with_oauth("google", &code)?;
    println!(
        "\nSigned in lecturer {} ({:?})",
        lecturer_user.name, lecturer_user.role
    );

    let advisor1 = service.add_lecturer(&lecturer_user, LecturerForm {
        name: lecturer_user.name.clone(),
        nip: lecturer_user.identifier.clone(),
        specialization: "Rekayasa Perangkat Lunak".to_string(),
    })?;
    let advisor2 = service.add_lecturer(&lecturer_user, LecturerForm {
        name: "Citra Dewi, M.Kom".to_string(),
        nip: "199003152015".to_string(),
        specialization: "Kecerdasan Buatan".to_string(),
    })?;
    let examiner = service.add_lecturer(&lecturer_user, LecturerForm {
        name: "Dedi Pratama, Ph.D".to_string(),
        nip: "197805202005".to_string(),
        specialization: "Sistem Terdistribusi".to_string(),
    })?;
    println!("Lecturer roster:");
    for lecturer in service.lecturers()? {
        println!("  {}", lecturer.letter_label());
    }

    let student = service
        .identity()
        .register(Registration {
            email: "ani@student.kampus.ac.id".to_string(),
            password: "rahasia123".to_string(),
            full_name: "Ani Lestari".to_string(),
            role: UserRole::Student,
            identifier: "2020110123".to_string(),
        })?;
    println!("\nRegistered student {} (NIM {})", student.name, student.identifier);

    println!("\nProposal");
    let proposal = service
        .submit_proposal(
            &student,
            ProposalForm {
                title: "Deteksi Plagiasi Skripsi Berbasis Embedding".to_string(),
                advisor1_id: Some(advisor1.id.as_str().to_string()),
                advisor2_id: Some(advisor2.id.as_str().to_string()),
            },
        )?
        .record;
    println!("  {} -> {}", proposal.title, proposal.status);
    let proposal = service.validate_proposal(&lecturer_user, proposal.id.as_str(), true)?;
    println!("  validated -> {}", proposal.status);

    let document = load_document(report.as_deref())?;

    println!("\n{}", SeminarKind::Proposal.label());
    println!(
        "  Requirements:\n    {}",
        service
            .requirement(RequirementKind::Sempro)
            .replace('\n', "\n    ")
    );
    let seminar = service.submit_seminar(
        &student,
        SeminarForm {
            kind: SeminarKind::Proposal,
            report: Some(document.clone()),
        },
    )?;
    for failure in &seminar.upload_failures {
        println!("  upload failed for {} ({})", failure.field, failure.file_name);
    }
    let scheduled = service.schedule_seminar(
        &lecturer_user,
        seminar.record.id.as_str(),
        &ScheduleRequest {
            date: Some(defense_date - Duration::days(30)),
            time: Some("10:00".to_string()),
            room: Some("Lab RPL".to_string()),
            examiner1_id: Some(examiner.id.as_str().to_string()),
            ..ScheduleRequest::default()
        },
    )?;
    println!("  {}", scheduled.notification.subject);
    let seminar = service.complete_seminar(&lecturer_user, scheduled.seminar.id.as_str())?;
    println!("  -> {}", seminar.status);

    println!("\nDefense");
    let defense = service
        .submit_defense(
            &student,
            DefenseForm {
                sks_count: 144,
                admin_requirements_met: true,
                fixed_manuscript: Some(document.clone()),
                plagiarism_check: Some(document.clone()),
                transcript: Some(document),
            },
        )?
        .record;
    println!("  {} credits -> {}", defense.sks_count, defense.status);
    let outcome = service.schedule_defense(
        &lecturer_user,
        defense.id.as_str(),
        &ScheduleRequest {
            date: Some(defense_date),
            time: Some("09:00".to_string()),
            room: Some("Ruang Sidang 1".to_string()),
            examiner1_id: Some(examiner.id.as_str().to_string()),
            examiner2_id: Some(advisor2.id.as_str().to_string()),
            letter_number: Some(format!("{:03}/TA/{}", 17, defense_date.format("%Y"))),
        },
    )?;
    println!("  -> {} on {}", outcome.defense.status, defense_date);
    match (&outcome.letter, &outcome.document_error) {
        (Some(letter), _) => {
            println!("  Letter: {} ({} bytes)", letter.name, letter.content.len());
            if let Some(dir) = output_dir.as_deref() {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(&letter.name);
                std::fs::write(&path, &letter.content)?;
                println!("  Written to {}", path.display());
            }
        }
        (None, Some(err)) => println!("  Letter unavailable: {err}"),
        (None, None) => println!("  Letter unavailable"),
    }
    if let Some(err) = &outcome.notification_error {
        println!("  Invitation not delivered: {err}");
    }

    println!("\nInternship");
    let internship = service
        .submit_internship(
            &student,
            InternshipForm {
                company_name: "PT Nusantara Data".to_string(),
                advisor_id: Some(advisor1.id.as_str().to_string()),
            },
        )?
        .record;
    let internship = service.validate_internship(&lecturer_user, internship.id.as_str(), true)?;
    println!("  {} -> {}", internship.company_name, internship.status);

    println!("\nDefense schedule export");
    print!("{}", service.export_defense_schedule()?);

    print_inbox(&service, &student.id)?;

    println!("\nUploaded files");
    for path in files.paths() {
        println!("  {path}");
    }

    service
        .identity()
        .logout()?;
    let mut signed_in = 0;
    let mut signed_out = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            IdentityEvent::SignedIn(_) => signed_in += 1,
            IdentityEvent::SignedOut => signed_out += 1,
        }
    }
    println!("\nSession events: {signed_in} sign-in, {signed_out} sign-out");

    Ok(())
}

fn print_inbox(service: &PortalService, user_id: &str) -> Result<(), AppError> {
    let inbox = service.inbox(user_id)?;
    let unread = inbox.iter().filter(|n| !n.is_read).count();
    println!("\nInbox ({unread} unread)");
    for notification in &inbox {
        println!(
            "  [{}] {} ({} attachment(s))",
            notification.timestamp.format("%Y-%m-%d %H:%M"),
            notification.subject,
            notification.attachments.len()
        );
    }
    if let Some(first) = inbox.first() {
        service.mark_notification_read(first.id.as_str())?;
    }
    Ok(())
}

fn load_document(path: Option<&Path>) -> Result<PendingFile, AppError> {
    let Some(path) = path else {
        return Ok(PendingFile {
            name: "naskah.pdf".to_string(),
            mime_type: mime_guess::mime::APPLICATION_PDF.to_string(),
            content: b"%PDF-1.4\n% demo document\n".to_vec(),
        });
    };

    let content = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("dokumen")
        .to_string();
    Ok(PendingFile {
        name,
        mime_type: mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string(),
        content,
    })
}

/// A minimal letter template covering every placeholder.
fn sample_template() -> Result<Vec<u8>, AppError> {
    const DOCUMENT: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
        r#"<w:p><w:r><w:t>Nomor: {no_surat}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t xml:space="preserve">Undangan Sidang Tugas Akhir </w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>Nama: {nama} ({nim})</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>Judul: {judul}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>Hari/Tanggal: {hari}, {tgl}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>Waktu/Ruang: {waktu} / {ruang}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>Pembimbing: {dosen1}; {dosen2}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>Penguji: {dosen3}; {dosen4}</w:t></w:r></w:p>"#,
        r#"</w:body></w:document>"#,
    );
    const CONTENT_TYPES: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Override PartName="/word/document.xml" "#,
        r#"ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        r#"</Types>"#,
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("word/document.xml", DOCUMENT),
    ] {
        writer
            .start_file(name, FileOptions::default())
            .map_err(std::io::Error::from)?;
        writer.write_all(body.as_bytes())?;
    }
    let archive = writer.finish().map_err(std::io::Error::from)?;
    Ok(archive.into_inner())
}
