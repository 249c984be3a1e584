pub mod input_bar;
pub mod login_form;
pub mod message_list;
pub mod photo;
