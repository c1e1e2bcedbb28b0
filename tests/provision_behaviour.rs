//! Behavioural scenarios for a full `cinder-pv` provisioning run.

mod provision;
