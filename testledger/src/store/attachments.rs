// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment links and step normalization.
//!
//! An attachment can be announced twice: once by a step that refers to it by
//! file name, and once when its bytes arrive. Both resolve to the same
//! [`AttachmentLink`] through the hash of the file name, in either order.

use super::{TestResultStore, normalize::duration};
use crate::{
    errors::StoreError,
    helpers::{content_type, hash_str},
    result_file::ResultFile,
};
use testledger_metadata::{
    AttachmentLink, AttachmentTestStepResult, DefaultTestStepResult, RawAttachmentStep, RawStep,
    RawTestStep, TestStepResult,
};
use tracing::debug;

impl TestResultStore {
    pub(super) fn normalize_steps(&mut self, steps: Vec<RawStep>) -> Vec<TestStepResult> {
        steps
            .into_iter()
            .map(|step| match step {
                RawStep::Step(step) => TestStepResult::Step(self.normalize_step(step)),
                RawStep::Attachment(attachment) => {
                    let name = attachment.name.clone();
                    let link_id = self.link_attachment(attachment);
                    TestStepResult::Attachment(AttachmentTestStepResult { link_id, name })
                }
            })
            .collect()
    }

    fn normalize_step(&mut self, step: RawTestStep) -> DefaultTestStepResult {
        let RawTestStep {
            name,
            status,
            error,
            start,
            stop,
            duration: explicit_duration,
            parameters,
            steps,
        } = step;

        DefaultTestStepResult {
            name: name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Unknown step".to_owned()),
            status: status.unwrap_or_default(),
            error,
            start,
            stop,
            duration: duration(explicit_duration, start, stop),
            parameters,
            steps: self.normalize_steps(steps),
        }
    }

    /// Records a reference to an attachment and returns its ID.
    ///
    /// Creates a placeholder marked missed if the file hasn't arrived yet. An
    /// explicitly reported content type replaces a guessed one.
    pub(super) fn link_attachment(&mut self, raw: RawAttachmentStep) -> String {
        let RawAttachmentStep {
            name,
            original_file_name,
            content_type: explicit_type,
        } = raw;
        let id = hash_str(&original_file_name);

        if let Some(link) = self.attachments.get_mut(&id) {
            link.used = true;
            if link.name.is_none() {
                link.name = name;
            }
            if let Some(explicit_type) = explicit_type {
                // An extension detected from the content gives way to the
                // declared type. One from the file name stays.
                if content_type::extension_of(&link.original_file_name).is_none() {
                    link.ext = content_type::extension_for(&explicit_type);
                }
                link.content_type = Some(explicit_type);
            }
            return id;
        }

        let ext = content_type::extension_of(&original_file_name).or_else(|| {
            explicit_type
                .as_deref()
                .and_then(content_type::extension_for)
        });
        let content_type = explicit_type.or_else(|| {
            ext.as_deref()
                .and_then(content_type::for_extension)
                .map(str::to_owned)
        });
        debug!("attachment `{original_file_name}` referenced before its file arrived");
        self.attachments.insert(
            id.clone(),
            AttachmentLink {
                id: id.clone(),
                name,
                original_file_name,
                content_type,
                ext,
                content_length: None,
                used: true,
                missed: true,
            },
        );
        id
    }

    /// Records the arrival of an attachment's bytes and returns its ID.
    ///
    /// The content type is taken from an existing link, then the file
    /// extension, then the leading bytes of the content.
    pub(super) fn attach_file(&mut self, file: ResultFile) -> Result<String, StoreError> {
        let original_file_name = file.original_file_name().to_owned();
        let id = hash_str(&original_file_name);
        let content_error = |error| StoreError::AttachmentContent {
            original_file_name: original_file_name.clone(),
            error,
        };
        let content_length = file.content_length().map_err(content_error)?;

        let existing_type = self
            .attachments
            .get(&id)
            .and_then(|link| link.content_type.clone());
        let ext = self
            .attachments
            .get(&id)
            .and_then(|link| link.ext.clone())
            .or_else(|| content_type::extension_of(&original_file_name));
        let detected_type = match existing_type {
            Some(existing) => Some(existing),
            None => match ext.as_deref().and_then(content_type::for_extension) {
                Some(by_ext) => Some(by_ext.to_owned()),
                None => {
                    let head = file
                        .read_head(content_type::SNIFF_LEN)
                        .map_err(content_error)?;
                    content_type::sniff(&head).map(str::to_owned)
                }
            },
        };
        let ext = ext.or_else(|| {
            detected_type
                .as_deref()
                .and_then(content_type::extension_for)
        });

        match self.attachments.get_mut(&id) {
            Some(link) => {
                link.missed = false;
                link.content_length = Some(content_length);
                link.content_type = detected_type;
                link.ext = ext;
            }
            None => {
                self.attachments.insert(
                    id.clone(),
                    AttachmentLink {
                        id: id.clone(),
                        name: None,
                        original_file_name,
                        content_type: detected_type,
                        ext,
                        content_length: Some(content_length),
                        used: false,
                        missed: false,
                    },
                );
            }
        }
        self.attachment_contents.insert(id.clone(), file);
        Ok(id)
    }
}
