//! Institute → class → subject cascade.
//!
//! A class only makes sense under an institute and a subject only under a
//! class, so every transition clears the levels below the one it changes.
//! Child and organization are independent of the cascade.

use super::model::{Child, Class, Institute, Organization, Subject};
use crate::error::{Error, Result};

/// Depth of the current cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionState {
    NoInstitute,
    InstituteOnly,
    InstituteAndClass,
    InstituteClassSubject,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    institute: Option<Institute>,
    class: Option<Class>,
    subject: Option<Subject>,
    child: Option<Child>,
    organization: Option<Organization>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        match (&self.institute, &self.class, &self.subject) {
            (None, _, _) => SelectionState::NoInstitute,
            (Some(_), None, _) => SelectionState::InstituteOnly,
            (Some(_), Some(_), None) => SelectionState::InstituteAndClass,
            (Some(_), Some(_), Some(_)) => SelectionState::InstituteClassSubject,
        }
    }

    /// Select an institute, clearing class and subject.
    ///
    /// Clearing the institute also drops child and organization: with no
    /// institute there is no context left to act in.
    pub fn select_institute(&mut self, institute: Option<Institute>) {
        self.class = None;
        self.subject = None;
        if institute.is_none() {
            self.child = None;
            self.organization = None;
        }
        self.institute = institute;
    }

    /// Select a class within the current institute, clearing the subject.
    ///
    /// # Errors
    ///
    /// `Error::InvalidSelection` when selecting a class with no institute.
    pub fn select_class(&mut self, class: Option<Class>) -> Result<()> {
        if class.is_some() && self.institute.is_none() {
            return Err(Error::InvalidSelection(
                "cannot select a class without an institute".to_string(),
            ));
        }
        self.subject = None;
        self.class = class;
        Ok(())
    }

    /// # Errors
    ///
    /// `Error::InvalidSelection` when selecting a subject with no class.
    pub fn select_subject(&mut self, subject: Option<Subject>) -> Result<()> {
        if subject.is_some() && self.class.is_none() {
            return Err(Error::InvalidSelection(
                "cannot select a subject without a class".to_string(),
            ));
        }
        self.subject = subject;
        Ok(())
    }

    pub fn select_child(&mut self, child: Option<Child>) {
        self.child = child;
    }

    pub fn select_organization(&mut self, organization: Option<Organization>) {
        self.organization = organization;
    }

    pub fn clear(&mut self) {
        *self = Selection::default();
    }

    pub fn institute(&self) -> Option<&Institute> {
        self.institute.as_ref()
    }

    pub fn class(&self) -> Option<&Class> {
        self.class.as_ref()
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn child(&self) -> Option<&Child> {
        self.child.as_ref()
    }

    pub fn organization(&self) -> Option<&Organization> {
        self.organization.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn institute(id: &str) -> Institute {
        Institute {
            id: id.to_string(),
            name: format!("Institute {}", id),
            code: None,
            user_role: None,
            image_url: None,
        }
    }

    fn class(id: &str) -> Class {
        Class {
            id: id.to_string(),
            name: format!("Class {}", id),
            code: None,
            grade: None,
        }
    }

    fn subject(id: &str) -> Subject {
        Subject {
            id: id.to_string(),
            name: format!("Subject {}", id),
            code: None,
        }
    }

    #[test]
    fn test_full_cascade() {
        let mut selection = Selection::new();
        assert_eq!(selection.state(), SelectionState::NoInstitute);

        selection.select_institute(Some(institute("I1")));
        assert_eq!(selection.state(), SelectionState::InstituteOnly);

        selection.select_class(Some(class("C1"))).expect("Class rejected");
        assert_eq!(selection.state(), SelectionState::InstituteAndClass);

        selection
            .select_subject(Some(subject("S1")))
            .expect("Subject rejected");
        assert_eq!(selection.state(), SelectionState::InstituteClassSubject);
    }

    #[test]
    fn test_new_institute_resets_descendants() {
        let mut selection = Selection::new();
        selection.select_institute(Some(institute("I1")));
        selection.select_class(Some(class("C1"))).expect("Class rejected");
        selection
            .select_subject(Some(subject("S1")))
            .expect("Subject rejected");

        selection.select_institute(Some(institute("I2")));

        assert_eq!(selection.state(), SelectionState::InstituteOnly);
        assert!(selection.class().is_none());
        assert!(selection.subject().is_none());
    }

    #[test]
    fn test_new_class_resets_subject() {
        let mut selection = Selection::new();
        selection.select_institute(Some(institute("I1")));
        selection.select_class(Some(class("C1"))).expect("Class rejected");
        selection
            .select_subject(Some(subject("S1")))
            .expect("Subject rejected");

        selection.select_class(Some(class("C2"))).expect("Class rejected");

        assert_eq!(selection.state(), SelectionState::InstituteAndClass);
        assert!(selection.subject().is_none());
    }

    #[test]
    fn test_orphan_selections_rejected() {
        let mut selection = Selection::new();
        assert!(matches!(
            selection.select_class(Some(class("C1"))),
            Err(Error::InvalidSelection(_))
        ));

        selection.select_institute(Some(institute("I1")));
        assert!(matches!(
            selection.select_subject(Some(subject("S1"))),
            Err(Error::InvalidSelection(_))
        ));
        assert_eq!(selection.state(), SelectionState::InstituteOnly);
    }

    #[test]
    fn test_clearing_institute_drops_side_channels() {
        let mut selection = Selection::new();
        selection.select_institute(Some(institute("I1")));
        selection.select_organization(Some(Organization {
            id: "O1".to_string(),
            name: "Alumni".to_string(),
            user_role: None,
        }));

        selection.select_institute(Some(institute("I2")));
        assert!(selection.organization().is_some());

        selection.select_institute(None);
        assert!(selection.organization().is_none());
        assert_eq!(selection, Selection::default());
    }
}
