use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::records::{FileStorage, Filter, PortalRecords, RecordsError, RemoteStore};
use crate::workflows::thesis::domain::{
    Attachment, Notification, RecordId, SeminarRegistration, ThesisDefense,
};

pub const DEFENSE_INVITATION_SUBJECT: &str = "Undangan & Berkas Sidang Tugas Akhir";

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error(transparent)]
    Records(#[from] RecordsError),
    #[error("notification {0} not found")]
    NotFound(String),
}

/// Records in-app messages for portal users.
pub struct NotificationDispatcher<S, F> {
    records: Arc<PortalRecords<S, F>>,
}

impl<S, F> NotificationDispatcher<S, F>
where
    S: RemoteStore + 'static,
    F: FileStorage + 'static,
{
    pub fn new(records: Arc<PortalRecords<S, F>>) -> Self {
        Self { records }
    }

    /// Create an unread notification for `recipient`.
    pub fn notify(
        &self,
        recipient: &str,
        subject: &str,
        message: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Notification, NotificationError> {
        let notification = Notification {
            id: RecordId::local("ntf"),
            user_id: recipient.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            is_read: false,
            attachments,
        };

        let saved = self.records.save(notification)?;
        info!(
            recipient,
            subject,
            attachments = saved.attachments.len(),
            "notification recorded"
        );
        Ok(saved)
    }

    /// Flag a notification as read. Marking it twice is not an error.
    pub fn mark_read(&self, id: &str) -> Result<Notification, NotificationError> {
        let mut notification = self
            .records
            .find::<Notification>(id)?
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;
        if notification.is_read {
            return Ok(notification);
        }

        notification.is_read = true;
        Ok(self.records.save(notification)?)
    }

    /// Notifications for a user, newest first.
    pub fn inbox(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        let mut notifications = self
            .records
            .list::<Notification>(&[Filter::eq("userId", user_id)])?;
        notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(notifications)
    }

    pub fn unread_count(&self, user_id: &str) -> Result<usize, NotificationError> {
        Ok(self
            .inbox(user_id)?
            .iter()
            .filter(|notification| !notification.is_read)
            .count())
    }

    /// Tell the student when and where the defense takes place, with the generated letter.
    pub fn defense_invitation(
        &self,
        defense: &ThesisDefense,
        letter: Option<Attachment>,
    ) -> Result<Notification, NotificationError> {
        let date = defense
            .defense_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let time = defense.defense_time.as_deref().unwrap_or("-");
        let message = format!(
            "Yth. {},\n\nSidang Anda dijadwalkan pada {date}, Pukul {time}.\n\n\
             Silahkan unduh dokumen terlampir (Undangan & Berita Acara) yang telah digenerate dari Template sistem.\n\
             Harap dicetak dan dibawa saat sidang.",
            defense.student_name
        );

        self.notify(
            &defense.student_id,
            DEFENSE_INVITATION_SUBJECT,
            &message,
            letter.into_iter().collect(),
        )
    }

    pub fn seminar_scheduled(
        &self,
        seminar: &SeminarRegistration,
    ) -> Result<Notification, NotificationError> {
        let date = seminar
            .scheduled_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let subject = format!("Jadwal {}", seminar.kind.label());
        let message = format!(
            "Yth. {},\n\n{} Anda dijadwalkan pada {date}, Pukul {} di ruang {}.",
            seminar.student_name,
            seminar.kind.label(),
            seminar.scheduled_time.as_deref().unwrap_or("-"),
            seminar.scheduled_room.as_deref().unwrap_or("-"),
        );

        self.notify(&seminar.student_id, &subject, &message, Vec::new())
    }
}
