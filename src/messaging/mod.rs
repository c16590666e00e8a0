// Messaging - Lock-free channels between control, input and scheduler threads

pub mod channels;
pub mod command;
pub mod notification;
