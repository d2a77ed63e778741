//! User-facing strings in English and French.
//!
//! Templates use `{placeholder}` markers filled by [`render`].

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Fr];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
        }
    }

    /// Unknown codes fall back to English.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "fr" => Language::Fr,
            _ => Language::En,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Fr => "Français",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKey {
    ChooseLanguage,
    AskName,
    AskGender,
    AskPreference,
    AskBirthdate,
    InvalidBirthdate,
    SettingsPrompt,
    AskNameSettings,
    Male,
    Female,
    Heterosexual,
    Homosexual,
    Bisexual,
    Name,
    Birthdate,
    Gender,
    SexualPreference,
    LanguageLabel,
    UploadStyle,
    SettingsSaved,
    ConfigType,
    StyleInstructions,
    SettingsSummary,
    ProcessedConversation,
    NothingToLearn,
    ProcessingPhoto,
    ProcessingVideo,
    GenderUpdated,
    PreferenceUpdated,
    LanguageUpdated,
    ErrorProcessing,
    ErrorProcessingMedia,
    ErrorPayment,
    ErrorGeneric,
    PremiumPaymentLink,
    PremiumRequired,
    CreditsBalance,
    PaymentReceived,
    PaymentsDisabled,
    WelcomeBack,
    FinishSetupFirst,
    Help,
}

/// Raw template for `key` in `lang`.
pub fn text(lang: Language, key: MessageKey) -> &'static str {
    match lang {
        Language::En => en(key),
        Language::Fr => fr(key),
    }
}

/// Template for `key` with every `{name}` marker from `args` substituted.
///
/// Markers without a matching argument are left untouched.
pub fn render(lang: Language, key: MessageKey, args: &[(&str, &str)]) -> String {
    fill(text(lang, key), args)
}

fn fill(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

pub const BIRTHDATE_FORMAT: &str = "DD/MM/YYYY";

fn en(key: MessageKey) -> &'static str {
    use MessageKey::*;
    match key {
        ChooseLanguage => "Please select your preferred language:\nVeuillez sélectionner votre langue préférée:",
        AskName => "Great! Now, what's your name?",
        AskGender => "Thanks! Now, what's your gender?",
        AskPreference => "What's your sexual preference?",
        AskBirthdate => "Can you give me your birthdate in the format {format}?",
        InvalidBirthdate => "Invalid birthdate format. Please use the format {format}",
        SettingsPrompt => "What would you like to change?",
        AskNameSettings => "Please enter your name:",
        Male => "Male",
        Female => "Female",
        Heterosexual => "Heterosexual",
        Homosexual => "Homosexual",
        Bisexual => "Bisexual",
        Name => "Name",
        Birthdate => "Birthdate",
        Gender => "Gender",
        SexualPreference => "Sexual Preference",
        LanguageLabel => "Language",
        UploadStyle => "Upload Conversation Style",
        SettingsSaved => "Your settings have been saved. You can edit them anytime by typing /settings",
        ConfigType => "Your {config_type} has been updated to: {value}",
        StyleInstructions => "To help me understand your conversation style, send me screenshots of your past conversations with the caption 'learn'.",
        SettingsSummary => "Perfect! Here are your settings:\n\n\
            Name: {name}\n\
            Gender: {gender}\n\
            Sexual Preference: {preference}\n\
            Language: {language}\n\
            Age: {age}\n\n\
            Your settings have been saved. You can edit them anytime by typing /settings\n\n\
            How can I help you?",
        ProcessedConversation => "Thanks! I've learned from your conversation style. I'll use this to provide more personalized suggestions.",
        NothingToLearn => "I couldn't find a conversation in that screenshot. Try another one?",
        ProcessingPhoto => "Analyzing image...",
        ProcessingVideo => "Watching your video...",
        GenderUpdated => "Your gender has been set to: {gender}",
        PreferenceUpdated => "Your sexual preference has been set to: {preference}",
        LanguageUpdated => "Language set to English.",
        ErrorProcessing => "Sorry, I couldn't process your message. Please try again.",
        ErrorProcessingMedia => "Sorry, I couldn't process your media. Please try again.",
        ErrorPayment => "Sorry, there was an error processing your payment. Please try again.",
        ErrorGeneric => "An error occurred. Please try again.",
        PremiumPaymentLink => "Click here to unlock premium features: {paymentUrl}",
        PremiumRequired => "Voice and video replies are a premium feature.",
        CreditsBalance => "You have {credits} premium credits left.",
        PaymentReceived => "Payment received! {credits} credits were added to your account.",
        PaymentsDisabled => "Premium features are not available right now.",
        WelcomeBack => "Hi {name} ! You already configured your bot, to change your settings, type /settings instead",
        FinishSetupFirst => "Let's finish setting you up first.",
        Help => "Send me a text, a screenshot of a chat or profile, a voice note or a video and I'll tell you what to say.\n\n\
            /settings change your profile\n\
            /premium unlock voice and video replies\n\
            Send screenshots with the caption 'learn' to teach me your style.",
    }
}

fn fr(key: MessageKey) -> &'static str {
    use MessageKey::*;
    match key {
        ChooseLanguage => "Please select your preferred language:\nVeuillez sélectionner votre langue préférée:",
        AskName => "Super ! Comment tu t'appelles ?",
        AskGender => "Merci ! Maintenant, quel est ton genre ?",
        AskPreference => "Quelle est ta préférence sexuelle ?",
        AskBirthdate => "Tu peux me donner ta date de naissance au format {format}",
        InvalidBirthdate => "Format de date invalide. Utilise le format {format}",
        SettingsPrompt => "Que souhaites-tu modifier ?",
        AskNameSettings => "Entre ton nom :",
        Male => "Homme",
        Female => "Femme",
        Heterosexual => "Hétérosexuel",
        Homosexual => "Homosexuel",
        Bisexual => "Bisexuel",
        Name => "Nom",
        Birthdate => "Date de naissance",
        Gender => "Genre",
        SexualPreference => "Préférence sexuelle",
        LanguageLabel => "Langue",
        UploadStyle => "Télécharger style de conversation",
        SettingsSaved => "Tes paramètres ont été enregistrés. Tu peux les modifier à tout moment en tapant /settings",
        ConfigType => "Ton {config_type} a été mis à jour à : {value}",
        StyleInstructions => "Pour m'aider à comprendre ton style de conversation, envoie-moi des captures d'écran de tes conversations passées avec la légende 'learn'.",
        SettingsSummary => "Parfait ! Voici tes paramètres :\n\n\
            Nom : {name}\n\
            Genre : {gender}\n\
            Préférence sexuelle : {preference}\n\
            Langue : {language}\n\
            Age : {age}\n\n\
            Tes paramètres ont été enregistrés. Tu peux les modifier à tout moment en tapant /settings\n\n\
            Comment je peux t'aider ?",
        ProcessedConversation => "Merci ! J'ai appris de ton style de conversation. Je vais l'utiliser pour fournir des suggestions plus personnalisées.",
        NothingToLearn => "Je n'ai pas trouvé de conversation sur cette capture. Essaie avec une autre ?",
        ProcessingPhoto => "Analyse de l'image...",
        ProcessingVideo => "Je regarde ta vidéo...",
        GenderUpdated => "Ton genre a été défini sur : {gender}",
        PreferenceUpdated => "Ta préférence sexuelle a été définie sur : {preference}",
        LanguageUpdated => "Langue définie sur le français.",
        ErrorProcessing => "Désolé, je n'ai pas pu traiter ton message. Essaie à nouveau.",
        ErrorProcessingMedia => "Désolé, je n'ai pas pu traiter ton média. Essaie à nouveau.",
        ErrorPayment => "Désolé, il y a eu une erreur lors du traitement de ton paiement. Essaie à nouveau.",
        ErrorGeneric => "Une erreur s'est produite. Essaie à nouveau.",
        PremiumPaymentLink => "Clique ici pour débloquer les fonctionnalités premium : {paymentUrl}",
        PremiumRequired => "Les réponses vocales et vidéo sont une fonctionnalité premium.",
        CreditsBalance => "Il te reste {credits} crédits premium.",
        PaymentReceived => "Paiement reçu ! {credits} crédits ont été ajoutés à ton compte.",
        PaymentsDisabled => "Les fonctionnalités premium ne sont pas disponibles pour le moment.",
        WelcomeBack => "Salut {name} ! Tu as déjà configuré ton bot, pour modifier tes paramètres, tape /settings à la place",
        FinishSetupFirst => "Terminons d'abord ta configuration.",
        Help => "Envoie-moi un texte, une capture d'écran de conversation ou de profil, un vocal ou une vidéo et je te dis quoi répondre.\n\n\
            /settings modifier ton profil\n\
            /premium débloquer les réponses vocales et vidéo\n\
            Envoie des captures avec la légende 'learn' pour m'apprendre ton style.",
    }
}
